//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::CharacterPhysicsBackend;
use crate::collision::CollisionData;
use crate::config::LocomotionConfig;
use crate::locomotion::LocomotionState;
use crate::look::LookAngles;
use crate::sensor::{sense, SensorReadings};
use crate::LocomotionSet;

/// Rapier3D physics backend for the locomotion controller.
///
/// This backend uses `bevy_rapier3d` for velocity, force and impulse
/// manipulation. Environment probes are cast by [`rapier_environment_sensing`],
/// which receives `RapierContext` as a system parameter.
pub struct Rapier3dBackend;

impl CharacterPhysicsBackend for Rapier3dBackend {
    type VelocityComponent = Velocity;

    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn has_body(world: &World, entity: Entity) -> bool {
        world.get::<RigidBody>(entity).is_some() && world.get::<Velocity>(entity).is_some()
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn get_position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
            .or_else(|| {
                world
                    .get::<GlobalTransform>(entity)
                    .map(|t| t.translation())
            })
            .unwrap_or(Vec3::ZERO)
    }

    fn set_position(world: &mut World, entity: Entity, position: Vec3) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.translation = position;
        }
    }

    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3) {
        if let Some(mut ext_impulse) = world.get_mut::<ExternalImpulse>(entity) {
            ext_impulse.impulse += impulse;
        } else if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            // Fallback: apply as velocity change if no ExternalImpulse component
            vel.linvel += impulse;
        }
    }

    fn apply_force(world: &mut World, entity: Entity, force: Vec3) {
        // Accumulated, then written to ExternalForce by apply_controller_forces
        if let Some(mut forces) = world.get_mut::<ControllerForces>(entity) {
            forces.pending += force;
        } else if let Some(mut ext_force) = world.get_mut::<ExternalForce>(entity) {
            ext_force.force += force;
        }
    }

    fn set_gravity_scale(world: &mut World, entity: Entity, scale: f32) {
        if let Some(mut gravity_scale) = world.get_mut::<GravityScale>(entity) {
            gravity_scale.0 = scale;
        } else if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
            entity_mut.insert(GravityScale(scale));
        }
    }

    fn set_linear_damping(world: &mut World, entity: Entity, damping: f32) {
        if let Some(mut current) = world.get_mut::<Damping>(entity) {
            current.linear_damping = damping;
        } else if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
            entity_mut.insert(Damping {
                linear_damping: damping,
                angular_damping: 0.0,
            });
        }
    }

    fn set_collider_height(world: &mut World, entity: Entity, height: f32, radius: f32) {
        if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
            entity_mut.insert(Collider::capsule_y(height * 0.5, radius));
        }
    }

    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }
}

/// Plugin that sets up Rapier3D-specific systems for the locomotion controller.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<ControllerForces>();

        // Clear forces from the previous step
        app.add_systems(
            FixedUpdate,
            clear_controller_forces.in_set(LocomotionSet::Preparation),
        );

        app.add_systems(
            FixedUpdate,
            rapier_environment_sensing.in_set(LocomotionSet::Sensors),
        );

        // Hand accumulated forces to Rapier before it steps
        app.add_systems(
            FixedUpdate,
            apply_controller_forces.in_set(LocomotionSet::Publish),
        );
    }
}

/// Forces the controller applied, kept apart from user forces on
/// [`ExternalForce`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct ControllerForces {
    /// Accumulated during the current step.
    pub pending: Vec3,
    /// Written to `ExternalForce` last step.
    pub applied: Vec3,
}

/// Perform a raycast using RapierContext.
fn rapier_raycast(
    context: &RapierContext,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
    filter: QueryFilter,
) -> Option<CollisionData> {
    context
        .cast_ray_and_get_normal(origin, direction, max_distance, true, filter)
        .map(|(hit_entity, hit)| {
            CollisionData::new(hit.time_of_impact, hit.normal, hit.point, Some(hit_entity))
        })
}

/// Rapier-specific environment sensing.
///
/// Casts the ground probe and, while airborne, the wall probes for every
/// controller, excluding the controller's own body and sensor colliders.
pub fn rapier_environment_sensing(
    mut commands: Commands,
    rapier_context: ReadRapierContext,
    mut q_controllers: Query<(
        Entity,
        &Transform,
        &Velocity,
        &LocomotionState,
        &LocomotionConfig,
        Option<&LookAngles>,
        Option<&CollisionGroups>,
        Option<&mut SensorReadings>,
    )>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, velocity, state, config, look, collision_groups, readings) in
        &mut q_controllers
    {
        let mut filter = QueryFilter::default()
            .exclude_rigid_body(entity)
            .exclude_sensors();
        if let Some(groups) = collision_groups {
            filter = filter.groups(*groups);
        }

        let rays = |origin: Vec3, direction: Vec3, max_distance: f32| {
            rapier_raycast(&context, origin, direction, max_distance, filter)
        };

        let sensed = sense(
            &rays,
            transform.translation,
            velocity.linvel,
            &look.copied().unwrap_or_default(),
            state.half_extent(config),
            state.mode.is_sliding(),
            config,
        );

        match readings {
            Some(mut readings) => *readings = sensed,
            None => {
                commands.entity(entity).insert(sensed);
            }
        }
    }
}

/// Remove last step's controller forces from [`ExternalForce`].
///
/// External user forces on the same component are preserved.
pub fn clear_controller_forces(mut q: Query<(&mut ExternalForce, &mut ControllerForces)>) {
    for (mut ext_force, mut forces) in &mut q {
        ext_force.force -= forces.applied;
        forces.applied = Vec3::ZERO;
        forces.pending = Vec3::ZERO;
    }
}

/// Write this step's accumulated controller forces to [`ExternalForce`].
pub fn apply_controller_forces(mut q: Query<(&mut ExternalForce, &mut ControllerForces)>) {
    for (mut ext_force, mut forces) in &mut q {
        ext_force.force += forces.pending;
        forces.applied = forces.pending;
        forces.pending = Vec3::ZERO;
    }
}

/// Bundle for creating a character with Rapier3D physics.
///
/// Provides every Rapier component the controller drives plus a unit mass
/// and frictionless contacts. The collider is supplied separately so its
/// height matches the [`LocomotionConfig`].
///
/// # Example
///
/// ```ignore
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use freerun_controller::prelude::*;
///
/// fn spawn_player(mut commands: Commands) {
///     let config = LocomotionConfig::default();
///     commands.spawn((
///         Transform::from_xyz(0.0, 2.0, 0.0),
///         LocomotionBundle::new(config),
///         LocalPlayer,
///         Rapier3dCharacterBundle::new(),
///         Collider::capsule_y(config.normal_height * 0.5, config.capsule_radius),
///     ));
/// }
/// ```
///
/// # Defaults
///
/// - `rigid_body`: [`RigidBody::Dynamic`]
/// - `locked_axes`: [`LockedAxes::ROTATION_LOCKED`], the body never tips over
/// - `damping`: linear 0.05 (overwritten every step by the controller)
/// - `mass`: 1.0, so impulses equal velocity changes
/// - `friction`: 0.0 with the `Min` combine rule
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    /// The rigid body type. Should typically be [`RigidBody::Dynamic`] for characters.
    pub rigid_body: RigidBody,
    /// Current linear and angular velocity. Updated by Rapier each physics step.
    pub velocity: Velocity,
    /// Forces applied this step.
    pub external_force: ExternalForce,
    /// Impulses applied this step, used for dashes.
    pub external_impulse: ExternalImpulse,
    /// Which axes are locked.
    pub locked_axes: LockedAxes,
    pub damping: Damping,
    pub gravity_scale: GravityScale,
    pub mass: ColliderMassProperties,
    /// Frictionless contacts; the controller owns horizontal speed.
    pub friction: Friction,
    pub controller_forces: ControllerForces,
}

impl Default for Rapier3dCharacterBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Rapier3dCharacterBundle {
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            external_force: ExternalForce::default(),
            external_impulse: ExternalImpulse::default(),
            locked_axes: LockedAxes::ROTATION_LOCKED,
            damping: Damping {
                linear_damping: 0.05,
                angular_damping: 0.0,
            },
            gravity_scale: GravityScale(1.0),
            mass: ColliderMassProperties::Mass(1.0),
            friction: Friction {
                coefficient: 0.0,
                combine_rule: CoefficientCombineRule::Min,
            },
            controller_forces: ControllerForces::default(),
        }
    }

    /// Set the rigid body type for the character.
    ///
    /// ```ignore
    /// let bundle = Rapier3dCharacterBundle::new()
    ///     .with_body(RigidBody::KinematicVelocityBased);
    /// ```
    pub fn with_body(mut self, body: RigidBody) -> Self {
        self.rigid_body = body;
        self
    }

    /// Set the collider mass.
    ///
    /// Impulses are divided by the mass, so dash strength scales inversely.
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = ColliderMassProperties::Mass(mass);
        self
    }

    /// Set which axes should be locked for the rigid body.
    pub fn with_locked_axes(mut self, axes: LockedAxes) -> Self {
        self.locked_axes = axes;
        self
    }
}
