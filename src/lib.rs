//! # `freerun_controller`
//!
//! A first-person freerunning character controller for 3D time-trial
//! platformers, with a physics backend abstraction.
//!
//! This crate provides a responsive, tuneable locomotion controller that:
//! - Runs and walks relative to the mouse-look yaw, with reduced air control
//! - Jumps with coyote time, jump buffering and a double jump
//! - Wall-runs along near-vertical surfaces and wall-jumps off them
//! - Slides under obstacles with a shrunken collider, and dashes
//! - Records every run and keeps the fastest one per level as a ghost replay
//! - Abstracts the physics backend for easy swapping (Rapier3D included)
//!
//! ## Architecture
//!
//! Every fixed step runs four ordered phases ([`LocomotionSet`]):
//! 1. **Preparation**: level requests are applied and the simulation clock advances
//! 2. **Sensors**: the backend casts ground and wall rays into [`sensor::SensorReadings`]
//! 3. **Locomotion**: the state machine consumes readings, input and its timing
//!    ledger, then writes velocity, gravity scale, damping and collider height
//! 4. **Publish**: marker components, telemetry, replay frames and the goal check
//!
//! Mouse look is integrated in `Update`, at render rate.
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use freerun_controller::prelude::*;
//!
//! // Locomotion components for a player character
//! let bundle = LocomotionBundle::new(LocomotionConfig::default());
//! let camera = LookConfig::default().with_sensitivity(0.002);
//!
//! // These can be spawned together with the backend's physics bundle
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod collision;
pub mod config;
pub mod goal;
pub mod intent;
pub mod ledger;
pub mod locomotion;
pub mod look;
pub mod replay;
pub mod sensor;
pub mod state;
pub mod systems;
pub mod telemetry;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::{CharacterPhysicsBackend, KinematicBody};
    pub use crate::config::{LocomotionConfig, LookConfig};
    pub use crate::goal::{GoalZone, LevelCompleted, LevelProgress, StartLevel, UnloadLevel};
    pub use crate::intent::{KeyBindings, LocalPlayer, LocomotionInput};
    pub use crate::ledger::SimulationClock;
    pub use crate::locomotion::{JumpKind, LocomotionEvent, LocomotionState};
    pub use crate::look::{FirstPersonCamera, LookAngles, PointerCapture};
    pub use crate::replay::{
        BestReplays, GhostPlayback, ReplayData, ReplayFrame, ReplayPersistence, ReplayRecorder,
    };
    pub use crate::sensor::SensorReadings;
    pub use crate::state::{Airborne, Dashing, Grounded, MovementMode, Sliding, WallRunning};
    pub use crate::telemetry::{LocomotionEventMessage, LocomotionTelemetry, TelemetryEvent};
    pub use crate::{FreerunControllerPlugin, LocomotionBundle, LocomotionSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle};
}

/// Ordered phases of one fixed locomotion step.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocomotionSet {
    /// Level requests, simulation clock and force bookkeeping.
    Preparation,
    /// Backend raycasts.
    Sensors,
    /// The state machine.
    Locomotion,
    /// Markers, telemetry, recording and goal detection.
    Publish,
}

/// Controller components for one character, without physics.
#[derive(Bundle, Default)]
pub struct LocomotionBundle {
    pub state: locomotion::LocomotionState,
    pub config: config::LocomotionConfig,
    pub input: intent::LocomotionInput,
    pub look: look::LookAngles,
    pub look_config: config::LookConfig,
    pub readings: sensor::SensorReadings,
}

impl LocomotionBundle {
    pub fn new(config: config::LocomotionConfig) -> Self {
        Self {
            config,
            ..default()
        }
    }

    /// Start facing `yaw` radians.
    pub fn facing(mut self, yaw: f32) -> Self {
        self.look = look::LookAngles::new(yaw, 0.0);
        self
    }

    pub fn with_look_config(mut self, look_config: config::LookConfig) -> Self {
        self.look_config = look_config;
        self
    }
}

/// Main plugin for the locomotion controller.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (raycasting, force application, etc.).
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// With Rapier3D backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use freerun_controller::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default().in_fixed_schedule())
///     .add_plugins(FreerunControllerPlugin::<Rapier3dBackend>::default().with_pointer_grab())
///     .run();
/// ```
pub struct FreerunControllerPlugin<B: backend::CharacterPhysicsBackend> {
    grab_pointer: bool,
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::CharacterPhysicsBackend> Default for FreerunControllerPlugin<B> {
    fn default() -> Self {
        Self {
            grab_pointer: false,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::CharacterPhysicsBackend> FreerunControllerPlugin<B> {
    /// Lock the cursor on left click and release it on Escape.
    pub fn with_pointer_grab(mut self) -> Self {
        self.grab_pointer = true;
        self
    }
}

impl<B: backend::CharacterPhysicsBackend> Plugin for FreerunControllerPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::LocomotionConfig>();
        app.register_type::<config::LookConfig>();
        app.register_type::<intent::LocomotionInput>();
        app.register_type::<intent::LocalPlayer>();
        app.register_type::<intent::KeyBindings>();
        app.register_type::<ledger::SimulationClock>();
        app.register_type::<locomotion::LocomotionState>();
        app.register_type::<look::LookAngles>();
        app.register_type::<look::PointerCapture>();
        app.register_type::<look::FirstPersonCamera>();
        app.register_type::<sensor::SensorReadings>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<state::WallRunning>();
        app.register_type::<state::Sliding>();
        app.register_type::<state::Dashing>();
        app.register_type::<telemetry::LocomotionTelemetry>();
        app.register_type::<goal::GoalZone>();
        app.register_type::<goal::LevelProgress>();

        app.add_event::<telemetry::TelemetryEvent>();
        app.add_event::<telemetry::LocomotionEventMessage>();
        app.add_event::<goal::StartLevel>();
        app.add_event::<goal::UnloadLevel>();
        app.add_event::<goal::LevelCompleted>();

        app.init_resource::<ledger::SimulationClock>();
        app.init_resource::<replay::ReplayRecorder>();
        app.init_resource::<replay::BestReplays>();
        app.init_resource::<look::PointerCapture>();
        app.init_resource::<intent::KeyBindings>();

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.configure_sets(
            FixedUpdate,
            (
                LocomotionSet::Preparation,
                LocomotionSet::Sensors,
                LocomotionSet::Locomotion,
                LocomotionSet::Publish,
            )
                .chain(),
        );

        app.add_systems(
            FixedUpdate,
            (
                goal::handle_level_requests,
                systems::advance_simulation_clock::<B>,
            )
                .chain()
                .in_set(LocomotionSet::Preparation),
        );
        app.add_systems(
            FixedUpdate,
            systems::apply_locomotion::<B>.in_set(LocomotionSet::Locomotion),
        );
        app.add_systems(
            FixedUpdate,
            (
                state::sync_state_markers,
                telemetry::publish_telemetry::<B>,
                replay::record_replay_frames::<B>,
                goal::check_goal::<B>,
            )
                .chain()
                .in_set(LocomotionSet::Publish),
        );

        app.add_systems(Startup, replay::load_best_replays);

        // Look runs at render rate
        app.add_systems(
            Update,
            (
                intent::read_keyboard_input,
                look::collect_mouse_motion,
                look::sync_pointer_capture,
                look::integrate_look,
                look::follow_look_target,
            )
                .chain(),
        );
        app.add_systems(Update, replay::drive_ghosts);

        if self.grab_pointer {
            app.add_systems(
                Update,
                look::grab_pointer.before(look::sync_pointer_capture),
            );
        }
    }
}
