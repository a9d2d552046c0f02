//! Camera/look integration.
//!
//! Mouse motion turns into yaw and pitch on [`LookAngles`]. Yaw also defines
//! the horizontal basis used for movement and wall probes; pitch only affects
//! the camera.

use bevy::input::mouse::AccumulatedMouseMotion;
use bevy::prelude::*;
use bevy::window::{CursorGrabMode, PrimaryWindow};

use crate::config::LookConfig;
use crate::intent::{InputSnapshot, LocalPlayer, LocomotionInput};

/// Yaw and pitch of a first-person view, in radians.
///
/// Yaw 0 faces -Z with +X to the right. Pitch is positive looking up.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct LookAngles {
    pub yaw: f32,
    pub pitch: f32,
}

impl LookAngles {
    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }

    /// Apply pointer motion. Moving right turns right, moving down looks down.
    ///
    /// Pitch never reaches straight up or down, whatever `max_pitch` holds.
    pub fn apply_mouse_delta(&mut self, delta: Vec2, config: &LookConfig) {
        let limit = config
            .max_pitch
            .abs()
            .min(std::f32::consts::FRAC_PI_2 - f32::EPSILON);
        self.yaw -= delta.x * config.sensitivity;
        self.pitch = (self.pitch - delta.y * config.sensitivity).clamp(-limit, limit);
    }

    /// Full camera orientation (yaw then pitch, no roll).
    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// Rotation about world up only.
    #[inline]
    pub fn yaw_rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw)
    }

    /// Horizontal facing direction.
    pub fn forward(&self) -> Vec3 {
        self.yaw_rotation() * Vec3::NEG_Z
    }

    /// Horizontal right direction.
    pub fn right(&self) -> Vec3 {
        self.yaw_rotation() * Vec3::X
    }

    /// World-space horizontal direction requested by the movement keys.
    ///
    /// Opposing keys cancel; diagonals are normalized.
    pub fn movement_direction(&self, input: &InputSnapshot) -> Vec3 {
        let (forward, right) = (self.forward(), self.right());
        let mut wish = Vec3::ZERO;
        if input.forward {
            wish += forward;
        }
        if input.backward {
            wish -= forward;
        }
        if input.right {
            wish += right;
        }
        if input.left {
            wish -= right;
        }
        wish.normalize_or_zero()
    }
}

/// Whether the pointer is captured by the game.
///
/// Look input is ignored while released.
#[derive(Resource, Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[reflect(Resource)]
pub struct PointerCapture {
    pub captured: bool,
}

/// Camera that follows a character's eye and look angles.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct FirstPersonCamera {
    /// Entity carrying [`LookAngles`] and a transform.
    pub target: Entity,
    /// Eye height above the target's origin.
    pub eye_height: f32,
}

impl FirstPersonCamera {
    pub fn new(target: Entity) -> Self {
        Self {
            target,
            eye_height: 0.6,
        }
    }

    pub fn with_eye_height(mut self, height: f32) -> Self {
        self.eye_height = height;
        self
    }
}

/// Mirror the primary window's cursor grab into [`PointerCapture`].
///
/// Leaves the resource untouched when there is no window.
pub fn sync_pointer_capture(
    q_window: Query<&Window, With<PrimaryWindow>>,
    mut capture: ResMut<PointerCapture>,
) {
    let Ok(window) = q_window.single() else {
        return;
    };
    let captured = window.cursor_options.grab_mode != CursorGrabMode::None;
    if capture.captured != captured {
        capture.captured = captured;
    }
}

/// Lock the cursor on left click, release it on Escape.
pub fn grab_pointer(
    mouse: Option<Res<ButtonInput<MouseButton>>>,
    keys: Option<Res<ButtonInput<KeyCode>>>,
    mut q_window: Query<&mut Window, With<PrimaryWindow>>,
) {
    let Ok(mut window) = q_window.single_mut() else {
        return;
    };

    if mouse.is_some_and(|m| m.just_pressed(MouseButton::Left)) {
        window.cursor_options.grab_mode = CursorGrabMode::Locked;
        window.cursor_options.visible = false;
    }
    if keys.is_some_and(|k| k.just_pressed(KeyCode::Escape)) {
        window.cursor_options.grab_mode = CursorGrabMode::None;
        window.cursor_options.visible = true;
    }
}

/// Feed this frame's mouse motion into the local player's input.
pub fn collect_mouse_motion(
    motion: Option<Res<AccumulatedMouseMotion>>,
    mut q_inputs: Query<&mut LocomotionInput, With<LocalPlayer>>,
) {
    let Some(motion) = motion else {
        return;
    };
    if motion.delta == Vec2::ZERO {
        return;
    }
    for mut input in &mut q_inputs {
        input.add_look_delta(motion.delta);
    }
}

/// Drain pending look deltas into [`LookAngles`].
///
/// Deltas received while the pointer is released are discarded.
pub fn integrate_look(
    capture: Res<PointerCapture>,
    mut q_look: Query<(&mut LookAngles, &mut LocomotionInput, Option<&LookConfig>)>,
) {
    for (mut look, mut input, config) in &mut q_look {
        let delta = input.take_look_delta();
        if !capture.captured || delta == Vec2::ZERO {
            continue;
        }
        look.apply_mouse_delta(delta, &config.copied().unwrap_or_default());
    }
}

/// Place first-person cameras at their target's eye, facing its look angles.
pub fn follow_look_target(
    q_targets: Query<(&Transform, &LookAngles), Without<FirstPersonCamera>>,
    mut q_cameras: Query<(&FirstPersonCamera, &mut Transform)>,
) {
    for (camera, mut transform) in &mut q_cameras {
        let Ok((target, look)) = q_targets.get(camera.target) else {
            continue;
        };
        transform.translation = target.translation + Vec3::Y * camera.eye_height;
        transform.rotation = look.orientation();
    }
}
