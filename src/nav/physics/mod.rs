//! Spatial query boundary.
//!
//! The navigation stages only ever ask two questions of the world: "what does
//! this ray hit" and "what does this sphere hit". [`SpatialQuery`] is that
//! seam. [`CollisionWorld`] is the built-in provider, rebuilt once per tick
//! from [`NavCollider`] components; a physics back-end can fill it directly
//! instead.

use bevy::prelude::*;

mod collision_world;

pub use collision_world::{rebuild_collision_world, CollisionWorld, WorldCollider};

/// Collision layers for filtering
pub mod layers {
    pub const NONE: u32 = 0;
    /// Bodies agents stand on and parent to.
    pub const SURFACE: u32 = 1 << 0;
    /// Anything that blocks walking.
    pub const OBSTACLE: u32 = 1 << 1;
    /// Static ground only terrain-capable agents may use.
    pub const TERRAIN: u32 = 1 << 2;
    pub const AGENT: u32 = 1 << 3;
    pub const ALL: u32 = u32::MAX;
}

/// Nearest hit of a ray or shape cast, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub entity: Entity,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Synchronous, side-effect-free world queries.
///
/// `direction` need not be normalized. Only colliders whose layers intersect
/// `mask` are considered.
pub trait SpatialQuery {
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: u32) -> Option<RayHit>;

    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: u32,
    ) -> Option<RayHit>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    /// Oriented box, centred on the entity origin.
    Cuboid { half_extents: Vec3 },
    Sphere { radius: f32 },
}

/// Makes an entity visible to [`CollisionWorld`].
///
/// The collider's world frame is the entity's frame in `SurfaceFrames` when it
/// is a surface or basis, the agent's surface frame for agents, and its plain
/// `Transform` otherwise.
#[derive(Component, Debug, Clone, Copy)]
pub struct NavCollider {
    pub shape: ColliderShape,
    pub layers: u32,
}

impl NavCollider {
    pub fn cuboid(half_extents: Vec3, layers: u32) -> Self {
        Self {
            shape: ColliderShape::Cuboid { half_extents },
            layers,
        }
    }

    pub fn sphere(radius: f32, layers: u32) -> Self {
        Self {
            shape: ColliderShape::Sphere { radius },
            layers,
        }
    }
}
