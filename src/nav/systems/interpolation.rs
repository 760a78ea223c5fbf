use bevy::prelude::*;
use bevy::utils::Parallel;
use surfnav_macros::profile;

use crate::nav::components::*;
use crate::nav::config::NavConfig;
use crate::nav::events::{NavAgentEvent, NavEventKind};
use crate::nav::math::{flatten, look_rotation, move_towards, JumpArc};
use crate::nav::physics::{layers, CollisionWorld, SpatialQuery};
use crate::nav::resources::{NavClock, SurfaceFrames};
use crate::profile_log;

// ============================================================================
// Walking
// ============================================================================

/// One walking step from `position` toward `waypoint`.
///
/// Follows `heading` in XZ when one is set, otherwise heads straight for the
/// waypoint. Height is interpolated toward the waypoint either way and the
/// step never overshoots it horizontally.
pub fn walk_step(position: Vec3, waypoint: Vec3, heading: Vec3, max_distance: f32) -> Vec3 {
    let to_waypoint = waypoint - position;
    let flat_distance = flatten(to_waypoint).length();
    let heading = flatten(heading).normalize_or_zero();
    if heading == Vec3::ZERO || flat_distance <= f32::EPSILON {
        return move_towards(position, waypoint, max_distance);
    }
    let travel = max_distance.min(flat_distance);
    let mut next = position + heading * travel;
    next.y = position.y + to_waypoint.y * (travel / flat_distance);
    next
}

/// What a walker does once its path buffer runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEnd {
    Arrived,
    Jump,
    Replan,
    GiveUp,
}

/// Decide how a finished path continues.
///
/// Off the end of a path short of the destination the agent jumps if the way
/// ahead is clear and the destination surface is reachable by jumping; if an
/// obstacle blocks the way it re-plans a limited number of times.
pub fn path_end<Q: SpatialQuery + ?Sized>(
    physics: &Q,
    at_destination: bool,
    jumpable: bool,
    world_position: Vec3,
    world_forward: Vec3,
    obstacle_replans: u32,
    config: &NavConfig,
) -> PathEnd {
    if at_destination {
        return PathEnd::Arrived;
    }
    let blocked = physics
        .cast_ray(world_position, world_forward, config.obstacle_raycast_distance, layers::OBSTACLE)
        .is_some();
    if !blocked && jumpable {
        PathEnd::Jump
    } else if blocked && obstacle_replans < config.max_obstacle_replans {
        PathEnd::Replan
    } else {
        PathEnd::GiveUp
    }
}

/// Move walkers along their path buffers.
#[profile]
pub fn walk_agents(
    par_commands: ParallelCommands,
    mut agents: Query<
        (Entity, &mut NavAgent, &mut Transform, &mut PathBuffer, &NavSteering),
        (With<NavWalking>, Without<NavCustomLerp>),
    >,
    jumpable: Query<&JumpableSurfaces>,
    physics: Res<CollisionWorld>,
    frames: Res<SurfaceFrames>,
    config: Res<NavConfig>,
    clock: Res<NavClock>,
    mut pending: Local<Parallel<Vec<NavAgentEvent>>>,
    mut events: MessageWriter<NavAgentEvent>,
) {
    let dt = clock.delta_seconds;
    let outbox = &*pending;
    agents
        .par_iter_mut()
        .for_each(|(entity, mut agent, mut transform, mut path, steering)| {
            let position = transform.translation;
            if let Some(waypoint) = path.current() {
                let next = walk_step(position, waypoint, steering.heading, agent.translation_speed * dt);
                transform.translation = next;

                let facing = if steering.heading == Vec3::ZERO {
                    flatten(waypoint - position)
                } else {
                    flatten(steering.heading)
                };
                if let Some(target) = look_rotation(facing, agent.ground_normal) {
                    let t = if agent.rotation_speed > 0.0 {
                        (dt / agent.rotation_speed).clamp(0.0, 1.0)
                    } else {
                        1.0
                    };
                    transform.rotation = transform.rotation.slerp(target, t);
                }

                if next.distance(waypoint) <= config.waypoint_tolerance {
                    path.advance();
                }
            }
            if !path.is_empty() {
                return;
            }

            let here = transform.translation;
            let destination = frames.reframe(agent.destination_surface, agent.surface, agent.local_destination);
            let at_destination = agent.has_destination()
                && here.distance(destination) <= agent.destination_tolerance.max(config.waypoint_tolerance);
            let can_jump = match (agent.surface, agent.destination_surface) {
                (Some(from), Some(to)) if from != to => jumpable.get(from).is_ok_and(|s| s.contains(to)),
                _ => false,
            };
            let world_forward = frames.rotation(agent.surface) * *transform.forward();
            let end = path_end(
                &*physics,
                at_destination,
                can_jump,
                frames.to_world(agent.surface, here),
                world_forward,
                agent.obstacle_replans,
                &config,
            );

            match end {
                PathEnd::Arrived => {
                    agent.clear_destination();
                    par_commands.command_scope(|mut commands| {
                        commands.entity(entity).remove::<(NavWalking, PathBuffer)>();
                    });
                    outbox.borrow_local_mut().push(NavAgentEvent {
                        agent: entity,
                        kind: NavEventKind::Arrived,
                    });
                }
                PathEnd::Jump => {
                    agent.jump_seconds = clock.elapsed_seconds;
                    par_commands.command_scope(|mut commands| {
                        commands
                            .entity(entity)
                            .remove::<(NavWalking, PathBuffer)>()
                            .insert((NavJumping, NavPlanning));
                    });
                }
                PathEnd::Replan => {
                    agent.obstacle_replans += 1;
                    par_commands.command_scope(|mut commands| {
                        commands
                            .entity(entity)
                            .remove::<(NavWalking, PathBuffer)>()
                            .insert(NavPlanning);
                    });
                }
                PathEnd::GiveUp => {
                    debug!("{:?} stopped short of its destination", entity);
                    agent.clear_destination();
                    par_commands.command_scope(|mut commands| {
                        commands.entity(entity).remove::<(NavWalking, PathBuffer)>();
                    });
                }
            }
        });

    events.write_batch(pending.drain());
    profile_log!(clock, "[WALK] dt: {}", dt);
}

// ============================================================================
// Jumping and Falling
// ============================================================================

/// Fly jumpers along their arc toward the jump buffer.
#[profile]
pub fn jump_agents(
    par_commands: ParallelCommands,
    mut agents: Query<
        (Entity, &mut NavAgent, &mut Transform, &JumpBuffer),
        (With<NavJumping>, Without<NavPlanning>, Without<NavCustomLerp>),
    >,
    frames: Res<SurfaceFrames>,
    config: Res<NavConfig>,
    clock: Res<NavClock>,
    mut pending: Local<Parallel<Vec<NavAgentEvent>>>,
    mut events: MessageWriter<NavAgentEvent>,
) {
    let dt = clock.delta_seconds;
    let now = clock.elapsed_seconds;
    let outbox = &*pending;
    agents
        .par_iter_mut()
        .for_each(|(entity, mut agent, mut transform, jump)| {
            if now - agent.jump_seconds > config.jump_seconds_max {
                debug!("{:?} missed its jump; falling", entity);
                agent.fall_seconds = now;
                agent.clear_destination();
                par_commands.command_scope(|mut commands| {
                    commands
                        .entity(entity)
                        .remove::<(NavJumping, JumpBuffer)>()
                        .insert(NavFalling);
                });
                outbox.borrow_local_mut().push(NavAgentEvent {
                    agent: entity,
                    kind: NavEventKind::Fell,
                });
                return;
            }

            let arc = JumpArc::solve(agent.jump_distance, agent.jump_degrees, agent.jump_gravity);
            let target = frames.reframe(agent.destination_surface, agent.surface, jump.0);
            let position = transform.translation;

            let level_target = Vec3::new(target.x, position.y, target.z);
            let mut next = move_towards(position, level_target, arc.horizontal * agent.jump_speed_multiplier_x * dt);
            let elapsed = (now - agent.jump_seconds) as f32;
            next.y += arc.vertical_step(agent.jump_gravity, elapsed, dt, agent.jump_speed_multiplier_y);
            transform.translation = next;

            if let Some(facing) = look_rotation(flatten(target - position), Vec3::Y) {
                transform.rotation = facing;
            }

            if flatten(target - next).length() <= config.jump_waypoint_tolerance {
                // Land over the target so the grounding ray starts above the destination surface.
                transform.translation.x = target.x;
                transform.translation.z = target.z;
                agent.surface_raycast_count = 0;
                par_commands.command_scope(|mut commands| {
                    commands
                        .entity(entity)
                        .remove::<NavJumping>()
                        .insert(NavNeedsSurface);
                });
            }
        });

    events.write_batch(pending.drain());
    profile_log!(clock, "[JUMP] dt: {}", dt);
}

/// Gravity-only motion for falling agents.
pub fn fall_agents(
    mut agents: Query<(&NavAgent, &mut Transform), (With<NavFalling>, Without<NavCustomLerp>)>,
    frames: Res<SurfaceFrames>,
    clock: Res<NavClock>,
) {
    let dt = clock.delta_seconds;
    let now = clock.elapsed_seconds;
    agents.par_iter_mut().for_each(|(agent, mut transform)| {
        let elapsed = (now - agent.fall_seconds) as f32;
        let drop = agent.jump_gravity * elapsed * dt * agent.jump_speed_multiplier_y;
        transform.translation += frames.vector_to_local(agent.surface, Vec3::NEG_Y * drop);
    });
}
