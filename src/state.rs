//! Locomotion mode and state marker components.
//!
//! [`MovementMode`] is the single source of truth for what the character is
//! doing. The marker components mirror it so gameplay code can filter queries
//! with `With<WallRunning>` and friends; they are added/removed by
//! [`sync_state_markers`] after every locomotion step.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ledger::Deadline;
use crate::locomotion::LocomotionState;
use crate::sensor::WallContact;

/// Mutually exclusive locomotion mode.
///
/// Dashing is not a mode: it is a timed flag on [`LocomotionState`] that can
/// overlap grounded or airborne movement.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub enum MovementMode {
    Grounded,
    Airborne,
    /// Running along a wall; the contact is refreshed every step.
    WallRunning(WallContact),
    /// Sliding until `until`, along the horizontal `direction` fixed at entry.
    Sliding { until: Deadline, direction: Vec3 },
}

impl Default for MovementMode {
    fn default() -> Self {
        Self::Airborne
    }
}

/// [`MovementMode`] without its payload.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MovementModeKind {
    Grounded,
    #[default]
    Airborne,
    WallRunning,
    Sliding,
}

impl MovementMode {
    pub fn kind(&self) -> MovementModeKind {
        match self {
            Self::Grounded => MovementModeKind::Grounded,
            Self::Airborne => MovementModeKind::Airborne,
            Self::WallRunning(_) => MovementModeKind::WallRunning,
            Self::Sliding { .. } => MovementModeKind::Sliding,
        }
    }

    #[inline]
    pub fn is_wall_running(&self) -> bool {
        matches!(self, Self::WallRunning(_))
    }

    #[inline]
    pub fn is_sliding(&self) -> bool {
        matches!(self, Self::Sliding { .. })
    }

    /// Current wall contact while wall-running.
    pub fn wall(&self) -> Option<&WallContact> {
        match self {
            Self::WallRunning(wall) => Some(wall),
            _ => None,
        }
    }
}

/// Marker component indicating the character is on the ground.
///
/// Present while grounded or sliding.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use freerun_controller::prelude::*;
///
/// fn check_grounded(grounded: Option<&Grounded>) -> bool {
///     grounded.is_some()
/// }
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the character is in the air (wall-running included).
///
/// Mutually exclusive with [`Grounded`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// Marker component present while wall-running.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct WallRunning {
    /// Normal of the wall being run on.
    pub normal: Vec3,
}

impl Default for WallRunning {
    fn default() -> Self {
        Self { normal: Vec3::X }
    }
}

/// Marker component present while sliding.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Sliding;

/// Marker component present while the dash flag is raised.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Dashing;

/// Sync state marker components from each controller's [`LocomotionState`].
pub fn sync_state_markers(
    mut commands: Commands,
    q_controllers: Query<(
        Entity,
        &LocomotionState,
        Has<Grounded>,
        Has<Airborne>,
        Option<&WallRunning>,
        Has<Sliding>,
        Has<Dashing>,
    )>,
) {
    for (entity, state, has_grounded, has_airborne, wall_marker, has_sliding, has_dashing) in
        &q_controllers
    {
        let on_ground = matches!(
            state.mode.kind(),
            MovementModeKind::Grounded | MovementModeKind::Sliding
        );

        // Sync Grounded/Airborne
        if on_ground && !has_grounded {
            commands.entity(entity).insert(Grounded).remove::<Airborne>();
        } else if !on_ground && !has_airborne {
            commands.entity(entity).insert(Airborne).remove::<Grounded>();
        }

        // Sync WallRunning, refreshing the normal as the wall changes
        match (state.mode.wall(), wall_marker) {
            (Some(wall), Some(marker)) if marker.normal != wall.normal => {
                commands.entity(entity).insert(WallRunning {
                    normal: wall.normal,
                });
            }
            (Some(wall), None) => {
                commands.entity(entity).insert(WallRunning {
                    normal: wall.normal,
                });
            }
            (None, Some(_)) => {
                commands.entity(entity).remove::<WallRunning>();
            }
            _ => {}
        }

        // Sync Sliding
        let sliding = state.mode.is_sliding();
        if sliding && !has_sliding {
            commands.entity(entity).insert(Sliding);
        } else if !sliding && has_sliding {
            commands.entity(entity).remove::<Sliding>();
        }

        // Sync Dashing
        let dashing = state.is_dashing();
        if dashing && !has_dashing {
            commands.entity(entity).insert(Dashing);
        } else if !dashing && has_dashing {
            commands.entity(entity).remove::<Dashing>();
        }
    }
}
