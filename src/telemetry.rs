//! Telemetry publishing.
//!
//! After every locomotion step the observable state of each character is
//! captured into a [`TelemetryFrame`], stored on the entity and broadcast as
//! an event for HUDs, audio and effects. Nothing here feeds back into physics.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::CharacterPhysicsBackend;
use crate::locomotion::{LocomotionEvent, LocomotionState};
use crate::sensor::horizontal;
use crate::state::MovementModeKind;

/// Derived observable state after one step.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryFrame {
    pub position: Vec3,
    pub velocity: Vec3,
    pub horizontal_speed: f32,
    pub grounded: bool,
    pub dashing: bool,
    pub wall_running: bool,
    pub sliding: bool,
    pub jump_count: u8,
    pub mode: MovementModeKind,
}

impl TelemetryFrame {
    pub fn capture(state: &LocomotionState, position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            horizontal_speed: horizontal(velocity).length(),
            grounded: state.is_grounded(),
            dashing: state.is_dashing(),
            wall_running: state.mode.is_wall_running(),
            sliding: state.mode.is_sliding(),
            jump_count: state.jump_count,
            mode: state.mode.kind(),
        }
    }
}

/// Latest telemetry of a character.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct LocomotionTelemetry {
    pub frame: TelemetryFrame,
}

/// Telemetry broadcast once per step per character.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct TelemetryEvent {
    pub entity: Entity,
    pub frame: TelemetryFrame,
}

/// A discrete locomotion transition of one character.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct LocomotionEventMessage {
    pub entity: Entity,
    pub event: LocomotionEvent,
}

/// Capture and broadcast telemetry for every controller.
pub fn publish_telemetry<B: CharacterPhysicsBackend>(world: &mut World) {
    let entities: Vec<(Entity, LocomotionState)> = world
        .query::<(Entity, &LocomotionState)>()
        .iter(world)
        .map(|(e, state)| (e, state.clone()))
        .collect();

    for (entity, state) in entities {
        if !B::has_body(world, entity) {
            continue;
        }

        let frame = TelemetryFrame::capture(
            &state,
            B::get_position(world, entity),
            B::get_velocity(world, entity),
        );

        if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
            entity_mut.insert(LocomotionTelemetry { frame });
        }
        world.send_event(TelemetryEvent { entity, frame });
    }
}
