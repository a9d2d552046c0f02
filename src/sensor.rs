//! Environment sensing.
//!
//! Short-range raycasts that tell the locomotion state machine whether the
//! character stands on something and whether a runnable wall is beside it.
//! The probes only need a [`RayCaster`], so they run identically against the
//! Rapier query pipeline and against test fakes.

use bevy::prelude::*;

use crate::collision::CollisionData;
use crate::config::LocomotionConfig;
use crate::look::LookAngles;

/// Anything that can answer a single raycast query.
///
/// A miss is `None`; it is a normal outcome, never an error.
pub trait RayCaster {
    /// Cast a ray from `origin` along the normalized `direction`.
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<CollisionData>;
}

impl<F> RayCaster for F
where
    F: Fn(Vec3, Vec3, f32) -> Option<CollisionData>,
{
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<CollisionData> {
        self(origin, direction, max_distance)
    }
}

/// A wall surface suitable for wall-running.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct WallContact {
    /// Unit surface normal, pointing away from the wall.
    pub normal: Vec3,
    /// World position of the probe hit.
    pub contact_point: Vec3,
    /// Distance from the probe origin to the wall.
    pub distance: f32,
}

impl WallContact {
    /// Build a contact from a raw hit, normalizing the normal.
    pub fn from_hit(hit: &CollisionData) -> Self {
        Self {
            normal: hit.normal.normalize_or_zero(),
            contact_point: hit.point,
            distance: hit.distance,
        }
    }

    /// Project `direction` onto the wall plane and flatten it.
    ///
    /// Returns zero when `direction` points straight into or out of the wall.
    pub fn tangent(&self, direction: Vec3) -> Vec3 {
        let along = direction - self.normal * direction.dot(self.normal);
        Vec3::new(along.x, 0.0, along.z).normalize_or_zero()
    }
}

/// Result of one step's environment probes.
///
/// Written by the backend's sensing system before the state machine runs.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct SensorReadings {
    /// The ground probe found a surface within grounded range.
    pub grounded: bool,
    /// A qualifying wall, when airborne and not sliding.
    pub wall: Option<WallContact>,
}

/// Horizontal (XZ) part of a vector.
#[inline]
pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Cast the ground probe.
///
/// The ray starts `ground_ray_lift` above the feet, where the feet sit
/// `half_extent` below the body centre, and points straight down.
pub fn probe_ground(
    rays: &impl RayCaster,
    position: Vec3,
    half_extent: f32,
    config: &LocomotionConfig,
) -> bool {
    let origin = position - Vec3::Y * half_extent + Vec3::Y * config.ground_ray_lift;
    rays.cast_ray(origin, Vec3::NEG_Y, config.ground_ray_distance)
        .is_some_and(|hit| hit.distance < config.grounded_distance())
}

/// Cast the four wall probes.
///
/// Skipped entirely below `wall_min_speed`. Probes run right, left, forward,
/// backward relative to the facing yaw; the first hit whose normal is steep
/// enough wins.
pub fn probe_walls(
    rays: &impl RayCaster,
    position: Vec3,
    velocity: Vec3,
    look: &LookAngles,
    config: &LocomotionConfig,
) -> Option<WallContact> {
    if horizontal(velocity).length() < config.wall_min_speed {
        return None;
    }

    let right = look.right();
    let forward = look.forward();
    let origin = position + Vec3::Y * config.wall_ray_lift;

    [right, -right, forward, -forward]
        .into_iter()
        .filter_map(|direction| rays.cast_ray(origin, direction, config.wall_detection_distance))
        .find(|hit| hit.is_wall(config.wall_angle_threshold))
        .map(|hit| WallContact::from_hit(&hit))
}

/// Run both probes the way the controller needs them for one step.
///
/// The wall probe only runs while airborne and not sliding.
pub fn sense(
    rays: &impl RayCaster,
    position: Vec3,
    velocity: Vec3,
    look: &LookAngles,
    half_extent: f32,
    sliding: bool,
    config: &LocomotionConfig,
) -> SensorReadings {
    let grounded = probe_ground(rays, position, half_extent, config);
    let wall = if grounded || sliding {
        None
    } else {
        probe_walls(rays, position, velocity, look, config)
    };
    SensorReadings { grounded, wall }
}
