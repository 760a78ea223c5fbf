use bevy::prelude::*;
use surfnav_macros::profile;

use crate::nav::components::*;
use crate::nav::config::NavConfig;
use crate::nav::math::flatten;
use crate::nav::physics::{layers, CollisionWorld, SpatialQuery};
use crate::nav::resources::{NavClock, SurfaceFrames};
use crate::nav::spatial_hash::{FlockMember, FlockingHash};
use crate::profile_log;

/// Flocking contributions from neighbours, all in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlockForces {
    pub separation: Vec3,
    pub alignment: Vec3,
    pub cohesion: Vec3,
    pub agent_avoidance: Vec3,
}

/// Separation, alignment, cohesion and closest-neighbour avoidance for one agent.
///
/// Each behaviour only sees neighbours strictly inside its own radius, so zero
/// radii yield zero forces.
pub fn flock_forces<'a>(
    agent: &NavAgent,
    position: Vec3,
    neighbours: impl IntoIterator<Item = &'a FlockMember>,
) -> FlockForces {
    let separation_radius = agent.separation_perception_radius;
    let alignment_radius = agent.alignment_perception_radius;
    let cohesion_radius = agent.cohesion_perception_radius;

    let mut forces = FlockForces::default();
    let mut alignment_count = 0;
    let mut cohesion_sum = Vec3::ZERO;
    let mut cohesion_count = 0;
    let mut closest: Option<(f32, Vec3)> = None;

    for neighbour in neighbours {
        let diff = flatten(position - neighbour.position);
        let distance = diff.length();

        if distance < separation_radius {
            if distance > f32::EPSILON {
                forces.separation += diff / (distance * distance);
            }
            if closest.is_none_or(|(d, _)| distance < d) {
                closest = Some((distance, diff));
            }
        }
        if distance < alignment_radius {
            forces.alignment += neighbour.forward;
            alignment_count += 1;
        }
        if distance < cohesion_radius {
            cohesion_sum += neighbour.position;
            cohesion_count += 1;
        }
    }

    if alignment_count > 0 {
        forces.alignment /= alignment_count as f32;
    }
    if cohesion_count > 0 {
        forces.cohesion = flatten(cohesion_sum / cohesion_count as f32 - position);
    }
    if let Some((distance, diff)) = closest {
        forces.agent_avoidance = diff.normalize_or_zero() * (1.0 - distance / separation_radius);
    }
    forces
}

/// Fan of obstacle rays around `forward`; pushes away from what they hit.
///
/// Strength falls off linearly with the distance to the closest hit.
pub fn obstacle_avoidance<Q: SpatialQuery + ?Sized>(
    physics: &Q,
    origin: Vec3,
    forward: Vec3,
    aversion_distance: f32,
    config: &NavConfig,
) -> Vec3 {
    let forward = flatten(forward).normalize_or_zero();
    if forward == Vec3::ZERO || aversion_distance <= 0.0 || config.obstacle_ray_count == 0 {
        return Vec3::ZERO;
    }

    let half_angle = config.obstacle_ray_half_angle_degrees.to_radians();
    let rays = config.obstacle_ray_count;
    let mut escape = Vec3::ZERO;
    let mut hits = 0;
    let mut closest = f32::INFINITY;

    for i in 0..rays {
        let angle = if rays == 1 {
            0.0
        } else {
            -half_angle + 2.0 * half_angle * i as f32 / (rays - 1) as f32
        };
        let direction = Quat::from_rotation_y(angle) * forward;
        let Some(hit) = physics.cast_ray(origin, direction, aversion_distance, layers::OBSTACLE) else {
            continue;
        };
        let away = flatten(hit.normal).normalize_or(-direction);
        escape += away;
        hits += 1;
        closest = closest.min(hit.distance);
    }

    if hits == 0 {
        return Vec3::ZERO;
    }
    (escape / hits as f32).normalize_or_zero() * (1.0 - closest / aversion_distance).max(0.0)
}

/// Blend the path heading with weighted steering forces.
///
/// Returns zero when there is no path heading to follow.
pub fn compose_heading(path_heading: Vec3, forces: &FlockForces, obstacle: Vec3, config: &NavConfig) -> Vec3 {
    if path_heading == Vec3::ZERO {
        return Vec3::ZERO;
    }
    let steering = forces.separation * config.separation_weight
        + forces.alignment * config.alignment_weight
        + forces.cohesion * config.cohesion_weight
        + forces.agent_avoidance * config.agent_avoidance_weight
        + obstacle * config.obstacle_avoidance_weight;
    (path_heading + flatten(steering)).normalize_or(path_heading)
}

/// Rehash every flocking agent by world position.
pub fn rebuild_flocking_hash(
    mut hash: ResMut<FlockingHash>,
    agents: Query<(Entity, &NavAgent, &Transform), With<NavFlocking>>,
    frames: Res<SurfaceFrames>,
    config: Res<NavConfig>,
) {
    if hash.cell_size() != config.flocking_cell_size {
        hash.set_cell_size(config.flocking_cell_size);
    }
    hash.clear();
    for (entity, agent, transform) in &agents {
        let forward = frames.rotation(agent.surface) * *transform.forward();
        hash.insert(FlockMember {
            entity,
            position: frames.to_world(agent.surface, transform.translation),
            forward: flatten(forward).normalize_or_zero(),
        });
    }
}

/// Compute this tick's steering for every agent.
///
/// Only walking agents steer; everyone else has their vectors reset so nothing
/// carries over into a later walk.
#[profile]
pub fn compute_steering(
    mut agents: Query<(
        Entity,
        &NavAgent,
        &Transform,
        &mut NavSteering,
        Option<&PathBuffer>,
        Has<NavWalking>,
        Has<NavFlocking>,
        Has<NavObstacleSteering>,
    )>,
    hash: Res<FlockingHash>,
    physics: Res<CollisionWorld>,
    frames: Res<SurfaceFrames>,
    config: Res<NavConfig>,
    clock: Res<NavClock>,
) {
    agents.par_iter_mut().for_each(
        |(entity, agent, transform, mut steering, path, walking, flocking, obstacle_steering)| {
            let waypoint = path.and_then(PathBuffer::current);
            let (true, Some(waypoint)) = (walking, waypoint) else {
                *steering = NavSteering::default();
                return;
            };

            let position = frames.to_world(agent.surface, transform.translation);
            let path_heading = flatten(frames.to_world(agent.surface, waypoint) - position).normalize_or_zero();

            let forces = if flocking {
                flock_forces(agent, position, hash.neighbours(entity, position))
            } else {
                FlockForces::default()
            };
            let obstacle = if obstacle_steering {
                let forward = if path_heading == Vec3::ZERO {
                    frames.rotation(agent.surface) * *transform.forward()
                } else {
                    path_heading
                };
                obstacle_avoidance(&*physics, position, forward, agent.obstacle_aversion_distance, &config)
            } else {
                Vec3::ZERO
            };

            let heading = compose_heading(path_heading, &forces, obstacle, &config);
            *steering = NavSteering {
                collision_avoidance: obstacle,
                agent_avoidance: forces.agent_avoidance,
                separation: forces.separation,
                cohesion: forces.cohesion,
                alignment: forces.alignment,
                heading: frames.vector_to_local(agent.surface, heading),
            };
        },
    );

    profile_log!(
        clock,
        "[STEERING] flock entries: {} in {} cells",
        hash.total_entries(),
        hash.non_empty_cells()
    );
}
