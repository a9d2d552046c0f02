//! Controller configuration components.
//!
//! This module defines the tuning for the locomotion state machine (speeds,
//! timing windows, wall-run and slide parameters, damping per mode) and for
//! mouse look. All durations are in seconds of simulation time, all speeds in
//! world units per second.

use std::f32::consts::FRAC_PI_2;
use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid RON for the config type.
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Configuration parameters for the locomotion state machine.
///
/// Defaults reproduce an arcade freerunning feel: fast ground movement,
/// reduced air control, short coyote/buffer windows and Earth gravity.
#[derive(Component, Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
#[serde(default)]
pub struct LocomotionConfig {
    // === Ground Movement ===
    /// Walking speed (any input other than pure forward).
    pub movement_speed: f32,
    /// Running speed (forward held without backward).
    pub run_speed: f32,
    /// Rate of the exponential approach toward target velocity on the ground.
    pub acceleration: f32,
    /// Rate of the exponential approach while airborne (scaled by `air_control`).
    pub air_acceleration: f32,
    /// Steering authority while airborne (0.0-1.0).
    pub air_control: f32,
    /// Rate at which grounded velocity decays when there is no input.
    pub deceleration: f32,

    // === Jumping ===
    /// Upward velocity of a ground or coyote jump.
    pub jump_force: f32,
    /// Upward velocity of the airborne second jump.
    pub double_jump_force: f32,
    /// Grace window after leaving the ground during which a ground jump still registers.
    pub coyote_time: f32,
    /// How long a jump press is remembered before it expires.
    pub jump_buffer_window: f32,
    /// Minimum time between two jumps of any kind.
    pub jump_min_interval: f32,

    // === Wall-running ===
    /// Target speed along the wall.
    pub wall_run_speed: f32,
    /// Rate of the approach toward `wall_run_speed`.
    pub wall_run_acceleration: f32,
    /// Gravity scale applied while wall-running.
    pub wall_run_gravity_scale: f32,
    /// Magnitude of the jump off a wall.
    pub wall_run_jump_force: f32,
    /// Weight of the wall normal in the wall-jump direction (added to world up).
    pub wall_jump_normal_blend: f32,
    /// Force pushing the character away from the wall while running on it.
    pub wall_push_force: f32,
    /// Maximum distance of the wall probes.
    pub wall_detection_distance: f32,
    /// Horizontal speed required to start or keep a wall-run.
    pub wall_min_speed: f32,
    /// Upper bound of `|normal.y|` for a surface to count as a wall.
    pub wall_angle_threshold: f32,
    /// Height above the body centre from which wall probes are cast.
    pub wall_ray_lift: f32,

    // === Sliding ===
    /// Minimum horizontal speed held during a slide.
    pub slide_speed: f32,
    /// Slide length before it ends on its own.
    pub slide_duration: f32,
    /// Time between two slides.
    pub slide_cooldown: f32,
    /// Horizontal speed required to start a slide.
    pub slide_min_speed: f32,
    /// Collider segment height while sliding.
    pub slide_height: f32,

    // === Dashing ===
    /// Impulse of a grounded dash.
    pub dash_force: f32,
    /// Impulse of an airborne dash.
    pub air_dash_force: f32,
    /// How long the dashing flag stays raised.
    pub dash_duration: f32,
    /// Time between two dashes.
    pub dash_cooldown: f32,

    // === Damping per mode ===
    pub ground_friction: f32,
    pub air_friction: f32,
    pub wall_run_friction: f32,
    pub slide_friction: f32,

    // === Body ===
    /// Collider segment height while standing.
    pub normal_height: f32,
    /// Capsule radius.
    pub capsule_radius: f32,

    // === Ground Sensor ===
    /// Maximum feet-to-ground distance that still counts as grounded.
    pub ground_check_distance: f32,
    /// Length of the ground probe.
    pub ground_ray_distance: f32,
    /// Height above the feet from which the ground probe starts.
    pub ground_ray_lift: f32,
    /// Tolerance added to `ground_check_distance`.
    pub ground_epsilon: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            // Ground movement
            movement_speed: 12.0,
            run_speed: 18.0,
            acceleration: 50.0,
            air_acceleration: 20.0,
            air_control: 0.3,
            deceleration: 40.0,

            // Jumping (~1m jump under 9.81 gravity)
            jump_force: 4.5,
            double_jump_force: 3.5,
            coyote_time: 0.15,
            jump_buffer_window: 0.1,
            jump_min_interval: 0.2,

            // Wall-running
            wall_run_speed: 16.0,
            wall_run_acceleration: 10.0,
            wall_run_gravity_scale: 0.3,
            wall_run_jump_force: 5.5,
            wall_jump_normal_blend: 0.5,
            wall_push_force: 2.0,
            wall_detection_distance: 0.6,
            wall_min_speed: 5.0,
            wall_angle_threshold: 0.7,
            wall_ray_lift: 0.5,

            // Sliding
            slide_speed: 20.0,
            slide_duration: 0.6,
            slide_cooldown: 0.3,
            slide_min_speed: 8.0,
            slide_height: 0.5,

            // Dashing
            dash_force: 25.0,
            air_dash_force: 20.0,
            dash_duration: 0.2,
            dash_cooldown: 0.5,

            // Damping
            ground_friction: 0.85,
            air_friction: 0.05,
            wall_run_friction: 0.1,
            slide_friction: 0.3,

            // Body
            normal_height: 1.0,
            capsule_radius: 0.4,

            // Ground sensor
            ground_check_distance: 0.1,
            ground_ray_distance: 0.5,
            ground_ray_lift: 0.1,
            ground_epsilon: 0.1,
        }
    }
}

impl LocomotionConfig {
    /// Parse a config from RON text. Missing fields keep their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a config from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&text)
    }

    /// Distance from the body centre to the bottom of the capsule for a
    /// given segment height.
    #[inline]
    pub fn half_extent(&self, segment_height: f32) -> f32 {
        segment_height * 0.5 + self.capsule_radius
    }

    /// Grounded threshold for the ground probe distance.
    #[inline]
    pub fn grounded_distance(&self) -> f32 {
        self.ground_check_distance + self.ground_epsilon
    }

    /// Damping applied in a given mode.
    pub fn friction_for(&self, mode: crate::state::MovementModeKind) -> f32 {
        use crate::state::MovementModeKind;
        match mode {
            MovementModeKind::Sliding => self.slide_friction,
            MovementModeKind::WallRunning => self.wall_run_friction,
            MovementModeKind::Grounded => self.ground_friction,
            MovementModeKind::Airborne => self.air_friction,
        }
    }

    /// Builder: set walk and run speeds.
    pub fn with_speeds(mut self, movement_speed: f32, run_speed: f32) -> Self {
        self.movement_speed = movement_speed;
        self.run_speed = run_speed;
        self
    }

    /// Builder: set ground acceleration and deceleration.
    pub fn with_acceleration(mut self, acceleration: f32, deceleration: f32) -> Self {
        self.acceleration = acceleration;
        self.deceleration = deceleration;
        self
    }

    /// Builder: set air control.
    pub fn with_air_control(mut self, air_control: f32) -> Self {
        self.air_control = air_control.clamp(0.0, 1.0);
        self
    }

    /// Builder: set coyote time.
    pub fn with_coyote_time(mut self, time: f32) -> Self {
        self.coyote_time = time;
        self
    }

    /// Builder: set the jump buffer window.
    pub fn with_jump_buffer_window(mut self, time: f32) -> Self {
        self.jump_buffer_window = time;
        self
    }

    /// Builder: set ground and double jump velocities.
    pub fn with_jump_forces(mut self, jump: f32, double_jump: f32) -> Self {
        self.jump_force = jump;
        self.double_jump_force = double_jump;
        self
    }

    /// Builder: set grounded and airborne dash impulses.
    pub fn with_dash_forces(mut self, ground: f32, air: f32) -> Self {
        self.dash_force = ground;
        self.air_dash_force = air;
        self
    }

    /// Builder: set dash cooldown.
    pub fn with_dash_cooldown(mut self, cooldown: f32) -> Self {
        self.dash_cooldown = cooldown;
        self
    }

    /// Builder: set the speed required to start a slide.
    pub fn with_slide_min_speed(mut self, speed: f32) -> Self {
        self.slide_min_speed = speed;
        self
    }
}

/// Mouse look configuration.
#[derive(Component, Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
#[serde(default)]
pub struct LookConfig {
    /// Radians of rotation per unit of mouse motion.
    pub sensitivity: f32,
    /// Maximum absolute pitch in radians. Kept below 90° to prevent inversion.
    pub max_pitch: f32,
}

impl Default for LookConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.003,
            max_pitch: FRAC_PI_2 - 0.1,
        }
    }
}

impl LookConfig {
    /// Builder: set mouse sensitivity.
    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.sensitivity = sensitivity;
        self
    }
}
