//! Core controller systems.
//!
//! These systems drive the locomotion state machine from the ECS. They are
//! generic over the physics backend to allow different physics engines to be
//! used.

use bevy::prelude::*;

use crate::backend::{BackendBody, CharacterPhysicsBackend};
use crate::config::LocomotionConfig;
use crate::intent::LocomotionInput;
use crate::ledger::SimulationClock;
use crate::locomotion::{LocomotionState, StepContext};
use crate::look::LookAngles;
use crate::sensor::SensorReadings;
use crate::telemetry::LocomotionEventMessage;

/// Advance the [`SimulationClock`] by one fixed timestep.
pub fn advance_simulation_clock<B: CharacterPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);
    world
        .get_resource_or_insert_with(SimulationClock::default)
        .advance(dt);
}

/// Step every controller's state machine once.
///
/// Reads the latest [`SensorReadings`], latches the input, mutates the body
/// through the backend and broadcasts the resulting locomotion events.
/// Controllers whose entity lacks a rigid body are skipped.
pub fn apply_locomotion<B: CharacterPhysicsBackend>(world: &mut World) {
    let now = world
        .get_resource::<SimulationClock>()
        .map_or(0.0, SimulationClock::elapsed);
    let dt = B::get_fixed_timestep(world);

    let entities: Vec<(Entity, LocomotionState, LocomotionConfig, LookAngles, SensorReadings)> =
        world
            .query_filtered::<(
                Entity,
                &LocomotionState,
                &LocomotionConfig,
                Option<&LookAngles>,
                Option<&SensorReadings>,
            ), With<LocomotionInput>>()
            .iter(world)
            .map(|(e, state, config, look, readings)| {
                (
                    e,
                    state.clone(),
                    *config,
                    look.copied().unwrap_or_default(),
                    readings.copied().unwrap_or_default(),
                )
            })
            .collect();

    for (entity, mut state, config, look, readings) in entities {
        if !B::has_body(world, entity) {
            warn_once!("Locomotion controller {entity} has no rigid body; skipping it");
            continue;
        }

        let Some(input) = world
            .get_mut::<LocomotionInput>(entity)
            .map(|mut input| input.latch())
        else {
            continue;
        };

        let ctx = StepContext {
            now,
            dt,
            config: &config,
            input,
            look,
            readings,
        };
        let report = state.step(
            &ctx,
            &mut BackendBody::<B>::new(world, entity, config.capsule_radius),
        );

        if let Some(mut stored) = world.get_mut::<LocomotionState>(entity) {
            *stored = state;
        }
        for event in report.events {
            world.send_event(LocomotionEventMessage { entity, event });
        }
    }
}
