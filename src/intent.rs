//! Locomotion input components.
//!
//! [`LocomotionInput`] holds the held state of every action as plain booleans.
//! Your code (or [`read_keyboard_input`]) fills it in; the controller latches
//! it once per fixed step into an [`InputSnapshot`], turning the jump button
//! into a press edge so a held key never re-jumps.

use bevy::prelude::*;

/// Desired locomotion for one character.
///
/// # Example
///
/// ```rust
/// use freerun_controller::prelude::*;
///
/// let mut input = LocomotionInput::default();
/// input.forward = true;
/// input.jump = true;
///
/// let first = input.latch();
/// assert!(first.jump_pressed);
/// assert!(first.is_running());
///
/// // Still held: no new press
/// let second = input.latch();
/// assert!(!second.jump_pressed);
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct LocomotionInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    /// Jump held.
    pub jump: bool,
    /// Dash/slide held. Level-triggered, gated by cooldowns.
    pub dash: bool,
    /// Pointer motion accumulated since the look integrator last ran.
    pub look_delta: Vec2,
    /// Previous step's jump state (for edge detection).
    pub(crate) jump_prev: bool,
}

impl LocomotionInput {
    /// Release every action.
    pub fn clear(&mut self) {
        *self = Self {
            jump_prev: self.jump_prev,
            ..Self::default()
        };
    }

    /// Add pointer motion to be consumed by the look integrator.
    pub fn add_look_delta(&mut self, delta: Vec2) {
        self.look_delta += delta;
    }

    /// Take the accumulated pointer motion, leaving zero behind.
    pub fn take_look_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.look_delta)
    }

    /// Read the input for one fixed step.
    ///
    /// A jump press is reported only on the step where the button goes from
    /// released to held.
    pub fn latch(&mut self) -> InputSnapshot {
        let jump_pressed = self.jump && !self.jump_prev;
        self.jump_prev = self.jump;
        InputSnapshot {
            forward: self.forward,
            backward: self.backward,
            left: self.left,
            right: self.right,
            jump_pressed,
            dash: self.dash,
        }
    }
}

/// Input as seen by a single locomotion step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    /// Jump went down this step.
    pub jump_pressed: bool,
    pub dash: bool,
}

impl InputSnapshot {
    /// Any directional key is held.
    #[inline]
    pub fn has_movement(&self) -> bool {
        self.forward || self.backward || self.left || self.right
    }

    /// Forward held without backward selects run speed.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.forward && !self.backward
    }
}

/// Marker for the character driven by local keyboard and mouse input.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct LocalPlayer;

/// Keyboard layout for [`read_keyboard_input`].
#[derive(Resource, Reflect, Debug, Clone, PartialEq)]
#[reflect(Resource)]
pub struct KeyBindings {
    pub forward: Vec<KeyCode>,
    pub backward: Vec<KeyCode>,
    pub left: Vec<KeyCode>,
    pub right: Vec<KeyCode>,
    pub jump: Vec<KeyCode>,
    pub dash: Vec<KeyCode>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            forward: vec![KeyCode::KeyW, KeyCode::ArrowUp],
            backward: vec![KeyCode::KeyS, KeyCode::ArrowDown],
            left: vec![KeyCode::KeyA, KeyCode::ArrowLeft],
            right: vec![KeyCode::KeyD, KeyCode::ArrowRight],
            jump: vec![KeyCode::Space],
            dash: vec![KeyCode::ShiftLeft, KeyCode::ShiftRight],
        }
    }
}

/// Copy held keys into the input of the local player.
///
/// Does nothing when no keyboard input resource exists (headless apps).
pub fn read_keyboard_input(
    keys: Option<Res<ButtonInput<KeyCode>>>,
    bindings: Res<KeyBindings>,
    mut q_inputs: Query<&mut LocomotionInput, With<LocalPlayer>>,
) {
    let Some(keys) = keys else {
        return;
    };

    for mut input in &mut q_inputs {
        input.forward = keys.any_pressed(bindings.forward.iter().copied());
        input.backward = keys.any_pressed(bindings.backward.iter().copied());
        input.left = keys.any_pressed(bindings.left.iter().copied());
        input.right = keys.any_pressed(bindings.right.iter().copied());
        input.jump = keys.any_pressed(bindings.jump.iter().copied());
        input.dash = keys.any_pressed(bindings.dash.iter().copied());
    }
}
