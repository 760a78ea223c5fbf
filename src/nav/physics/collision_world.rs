use bevy::math::Affine3A;
use bevy::prelude::*;

use super::{ColliderShape, NavCollider, RayHit, SpatialQuery};
use crate::nav::components::NavAgent;
use crate::nav::resources::SurfaceFrames;

const PARALLEL_EPSILON: f32 = 1e-8;

/// A collider snapshot in world space.
#[derive(Debug, Clone, Copy)]
pub struct WorldCollider {
    pub entity: Entity,
    pub shape: ColliderShape,
    pub layers: u32,
    pub to_world: Affine3A,
    to_local: Affine3A,
}

impl WorldCollider {
    pub fn new(entity: Entity, shape: ColliderShape, layers: u32, to_world: Affine3A) -> Self {
        Self {
            entity,
            shape,
            layers,
            to_world,
            to_local: to_world.inverse(),
        }
    }

    /// Distance along `dir` (unit length) to this collider grown by `inflate`.
    fn intersect(&self, origin: Vec3, dir: Vec3, max_distance: f32, inflate: f32) -> Option<(f32, Vec3)> {
        match self.shape {
            ColliderShape::Cuboid { half_extents } => {
                let local_origin = self.to_local.transform_point3(origin);
                let local_dir = self.to_local.transform_vector3(dir);
                let (t, local_normal) =
                    ray_box(local_origin, local_dir, half_extents + Vec3::splat(inflate), max_distance)?;
                let normal = self.to_world.transform_vector3(local_normal).normalize_or(-dir);
                Some((t, normal))
            }
            ColliderShape::Sphere { radius } => {
                let center: Vec3 = self.to_world.translation.into();
                let t = ray_sphere(origin, dir, center, radius + inflate, max_distance)?;
                let normal = (origin + dir * t - center).normalize_or(-dir);
                Some((t, normal))
            }
        }
    }
}

/// Slab test against an axis-aligned box centred at the origin.
///
/// A ray starting inside the box hits at `t = 0` facing back along the ray.
fn ray_box(origin: Vec3, dir: Vec3, half: Vec3, max_distance: f32) -> Option<(f32, Vec3)> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        let h = half[axis];
        if d.abs() < PARALLEL_EPSILON {
            if o < -h || o > h {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let mut t1 = (-h - o) * inv;
        let mut t2 = (h - o) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        if t1 > t_min {
            t_min = t1;
            normal = Vec3::ZERO;
            normal[axis] = -d.signum();
        }
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }

    if t_max < 0.0 {
        return None;
    }
    if t_min < 0.0 {
        return Some((0.0, -dir));
    }
    (t_min <= max_distance).then_some((t_min, normal))
}

fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32, max_distance: f32) -> Option<f32> {
    let m = origin - center;
    let c = m.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    let b = m.dot(dir);
    if b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    (t <= max_distance).then_some(t.max(0.0))
}

/// Built-in [`SpatialQuery`] provider: a flat list of world-space colliders.
#[derive(Resource, Debug, Default)]
pub struct CollisionWorld {
    colliders: Vec<WorldCollider>,
}

impl CollisionWorld {
    pub fn clear(&mut self) {
        self.colliders.clear();
    }

    pub fn push(&mut self, collider: WorldCollider) {
        self.colliders.push(collider);
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    fn nearest(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: u32, inflate: f32) -> Option<RayHit> {
        let dir = direction.try_normalize()?;
        let mut best: Option<RayHit> = None;
        for collider in &self.colliders {
            if collider.layers & mask == 0 {
                continue;
            }
            let Some((t, normal)) = collider.intersect(origin, dir, max_distance, inflate) else {
                continue;
            };
            if best.is_none_or(|b| t < b.distance) {
                best = Some(RayHit {
                    entity: collider.entity,
                    point: origin + dir * t - normal * inflate,
                    normal,
                    distance: t,
                });
            }
        }
        best
    }
}

impl SpatialQuery for CollisionWorld {
    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: u32) -> Option<RayHit> {
        self.nearest(origin, direction, max_distance, mask, 0.0)
    }

    /// Boxes are grown by `radius` on every axis, so edges and corners are
    /// slightly conservative.
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: u32,
    ) -> Option<RayHit> {
        self.nearest(origin, direction, max_distance, mask, radius.max(0.0))
    }
}

/// Snapshot every [`NavCollider`] into world space.
pub fn rebuild_collision_world(
    mut world: ResMut<CollisionWorld>,
    frames: Res<SurfaceFrames>,
    colliders: Query<(Entity, &NavCollider, &Transform, Option<&NavAgent>)>,
) {
    world.clear();
    for (entity, collider, transform, agent) in colliders.iter() {
        let to_world = if let Some(agent) = agent {
            frames.world(agent.surface) * transform.compute_affine()
        } else if let Some(frame) = frames.get(entity) {
            *frame
        } else {
            transform.compute_affine()
        };
        world.push(WorldCollider::new(entity, collider.shape, collider.layers, to_world));
    }
}
