//! Raycast result structures.
//!
//! These structures hold the results of physics queries used by the
//! environment sensor for ground and wall detection.

use bevy::prelude::*;

/// Information about a raycast hit.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionData {
    /// Distance along the ray to the hit point.
    pub distance: f32,
    /// Normal of the surface at the hit point.
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
    /// Entity that was hit (if the backend reports one).
    pub entity: Option<Entity>,
}

impl CollisionData {
    /// Create a collision result.
    pub fn new(distance: f32, normal: Vec3, point: Vec3, entity: Option<Entity>) -> Self {
        Self {
            distance,
            normal,
            point,
            entity,
        }
    }

    /// Whether the hit surface is steep enough to count as a wall.
    ///
    /// `threshold` bounds the magnitude of the normal's vertical component;
    /// floors and ceilings have `|normal.y|` close to 1.
    #[inline]
    pub fn is_wall(&self, threshold: f32) -> bool {
        self.normal.y.abs() < threshold
    }
}
