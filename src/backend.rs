//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement
//! to work with the locomotion controller, and the [`KinematicBody`] view the
//! state machine mutates. This allows easy swapping between physics engines
//! (Rapier3D, a custom integrator, test fakes).

use std::marker::PhantomData;

use bevy::prelude::*;

/// Mutable view of one rigid body, as seen by a locomotion step.
///
/// Forces act over the next physics step; impulses change momentum at once
/// (backends may defer them to the next physics step).
pub trait KinematicBody {
    fn linear_velocity(&self) -> Vec3;
    fn set_linear_velocity(&mut self, velocity: Vec3);
    fn position(&self) -> Vec3;
    fn set_position(&mut self, position: Vec3);
    fn apply_impulse(&mut self, impulse: Vec3);
    fn apply_force(&mut self, force: Vec3);
    fn set_gravity_scale(&mut self, scale: f32);
    fn set_linear_damping(&mut self, damping: f32);
    /// Resize the capsule's cylindrical segment, keeping its radius.
    fn set_collider_height(&mut self, height: f32);
}

/// Trait for physics backend implementations.
///
/// Implement this trait to integrate a physics engine with the locomotion
/// controller. The backend handles velocity manipulation, force application
/// and collider edits; raycasting is done by a backend-specific sensing
/// system that writes [`SensorReadings`](crate::sensor::SensorReadings).
///
/// For an example implementation, see the `rapier` module's `Rapier3dBackend`.
pub trait CharacterPhysicsBackend: 'static + Send + Sync {
    /// The velocity component type used by this backend.
    type VelocityComponent: Component;

    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Whether `entity` carries the components this backend drives.
    fn has_body(world: &World, entity: Entity) -> bool;

    /// Get the current velocity of an entity.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the velocity of an entity.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Get the current position of an entity.
    fn get_position(world: &World, entity: Entity) -> Vec3;

    /// Teleport an entity.
    fn set_position(world: &mut World, entity: Entity, position: Vec3);

    /// Apply an impulse to an entity.
    ///
    /// Impulse is an instantaneous change in momentum (velocity).
    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3);

    /// Apply a force to an entity.
    ///
    /// Force is applied over the physics timestep.
    fn apply_force(world: &mut World, entity: Entity, force: Vec3);

    /// Scale the world gravity for this entity.
    fn set_gravity_scale(world: &mut World, entity: Entity, scale: f32);

    /// Set linear damping.
    fn set_linear_damping(world: &mut World, entity: Entity, damping: f32);

    /// Replace the entity's capsule collider.
    fn set_collider_height(world: &mut World, entity: Entity, height: f32, radius: f32);

    /// Get the fixed timestep delta time.
    fn get_fixed_timestep(world: &World) -> f32;
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

/// [`KinematicBody`] over an entity in a [`World`], routed through backend `B`.
pub struct BackendBody<'w, B: CharacterPhysicsBackend> {
    world: &'w mut World,
    entity: Entity,
    capsule_radius: f32,
    _marker: PhantomData<B>,
}

impl<'w, B: CharacterPhysicsBackend> BackendBody<'w, B> {
    pub fn new(world: &'w mut World, entity: Entity, capsule_radius: f32) -> Self {
        Self {
            world,
            entity,
            capsule_radius,
            _marker: PhantomData,
        }
    }
}

impl<B: CharacterPhysicsBackend> KinematicBody for BackendBody<'_, B> {
    fn linear_velocity(&self) -> Vec3 {
        B::get_velocity(self.world, self.entity)
    }

    fn set_linear_velocity(&mut self, velocity: Vec3) {
        B::set_velocity(self.world, self.entity, velocity);
    }

    fn position(&self) -> Vec3 {
        B::get_position(self.world, self.entity)
    }

    fn set_position(&mut self, position: Vec3) {
        B::set_position(self.world, self.entity, position);
    }

    fn apply_impulse(&mut self, impulse: Vec3) {
        B::apply_impulse(self.world, self.entity, impulse);
    }

    fn apply_force(&mut self, force: Vec3) {
        B::apply_force(self.world, self.entity, force);
    }

    fn set_gravity_scale(&mut self, scale: f32) {
        B::set_gravity_scale(self.world, self.entity, scale);
    }

    fn set_linear_damping(&mut self, damping: f32) {
        B::set_linear_damping(self.world, self.entity, damping);
    }

    fn set_collider_height(&mut self, height: f32) {
        B::set_collider_height(self.world, self.entity, height, self.capsule_radius);
    }
}
