//! Resource definitions shared by the navigation stages.
use bevy::math::Affine3A;
use bevy::prelude::*;
use rustc_hash::FxHashMap;

// ============================================================================
// Clock
// ============================================================================

/// Navigation time, advanced by a fixed `1 / tick_rate` at the start of each tick.
///
/// Every timestamp stored on an agent is an `elapsed_seconds` value.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct NavClock {
    pub tick: u64,
    pub elapsed_seconds: f64,
    pub delta_seconds: f32,
}

impl NavClock {
    pub fn advance(&mut self, tick_rate: f64) {
        self.tick += 1;
        self.elapsed_seconds += 1.0 / tick_rate;
        self.delta_seconds = (1.0 / tick_rate) as f32;
    }

    /// Seconds elapsed since `timestamp`.
    pub fn since(&self, timestamp: f64) -> f32 {
        (self.elapsed_seconds - timestamp) as f32
    }
}

// ============================================================================
// Surface Frames
// ============================================================================

/// Basis chains longer than this are treated as cycles.
pub const MAX_FRAME_DEPTH: usize = 64;

/// World transform of every frame entity (surfaces and bases), rebuilt each tick.
#[derive(Resource, Debug, Default)]
pub struct SurfaceFrames {
    frames: FxHashMap<Entity, Affine3A>,
}

impl SurfaceFrames {
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn insert(&mut self, entity: Entity, to_world: Affine3A) {
        self.frames.insert(entity, to_world);
    }

    pub fn get(&self, entity: Entity) -> Option<&Affine3A> {
        self.frames.get(&entity)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Local-to-world transform of a surface. `None` or unknown surfaces are the world.
    pub fn world(&self, surface: Option<Entity>) -> Affine3A {
        surface
            .and_then(|s| self.frames.get(&s))
            .copied()
            .unwrap_or(Affine3A::IDENTITY)
    }

    pub fn to_world(&self, surface: Option<Entity>, local: Vec3) -> Vec3 {
        self.world(surface).transform_point3(local)
    }

    pub fn to_local(&self, surface: Option<Entity>, world: Vec3) -> Vec3 {
        self.world(surface).inverse().transform_point3(world)
    }

    pub fn rotation(&self, surface: Option<Entity>) -> Quat {
        let (_, rotation, _) = self.world(surface).to_scale_rotation_translation();
        rotation
    }

    pub fn vector_to_world(&self, surface: Option<Entity>, local: Vec3) -> Vec3 {
        self.world(surface).transform_vector3(local)
    }

    pub fn vector_to_local(&self, surface: Option<Entity>, world: Vec3) -> Vec3 {
        self.world(surface).inverse().transform_vector3(world)
    }

    /// Re-express a point local to `from` in the frame of `to`.
    pub fn reframe(&self, from: Option<Entity>, to: Option<Entity>, local: Vec3) -> Vec3 {
        if from == to {
            return local;
        }
        self.to_local(to, self.to_world(from, local))
    }

    /// Move a transform local to `from` into the frame of `to`, keeping its world pose.
    pub fn reparent(&self, from: Option<Entity>, to: Option<Entity>, transform: &mut Transform) {
        if from == to {
            return;
        }
        let world_rotation = self.rotation(from) * transform.rotation;
        transform.translation = self.reframe(from, to, transform.translation);
        transform.rotation = (self.rotation(to).inverse() * world_rotation).normalize();
    }
}
