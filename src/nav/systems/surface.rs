use bevy::prelude::*;
use bevy::utils::Parallel;
use surfnav_macros::profile;

use crate::nav::components::*;
use crate::nav::config::NavConfig;
use crate::nav::events::{NavAgentEvent, NavEventKind};
use crate::nav::physics::{CollisionWorld, RayHit, SpatialQuery};
use crate::nav::resources::{NavClock, SurfaceFrames};
use crate::profile_log;

/// Result of one grounding probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroundProbe {
    Hit(RayHit),
    /// Missed; `falling` once the miss counter reached the threshold.
    Miss { falling: bool },
}

/// Cast the grounding ray for one agent and advance its miss counter.
pub fn probe_ground<Q: SpatialQuery + ?Sized>(
    physics: &Q,
    agent: &mut NavAgent,
    world_origin: Vec3,
    layers: u32,
    config: &NavConfig,
) -> GroundProbe {
    match physics.cast_ray(world_origin, Vec3::NEG_Y, config.surface_raycast_distance, layers) {
        Some(hit) => {
            agent.surface_raycast_count = 0;
            GroundProbe::Hit(hit)
        }
        None => {
            agent.surface_raycast_count += 1;
            GroundProbe::Miss {
                falling: agent.surface_raycast_count >= config.surface_raycast_max,
            }
        }
    }
}

/// Look for ground under every agent that needs a surface.
///
/// A hit re-parents the agent to the hit body and snaps it onto it; a pending
/// jump target on that body is taken as the landing point and planning
/// resumes unless a stop is pending. Consecutive misses only turn into falling once the miss counter
/// reaches `surface_raycast_max`.
#[profile]
pub fn track_surfaces(
    par_commands: ParallelCommands,
    mut agents: Query<
        (Entity, &mut NavAgent, &mut Transform, Option<&JumpBuffer>, Has<NavTerrainCapable>, Has<NavStop>),
        With<NavNeedsSurface>,
    >,
    physics: Res<CollisionWorld>,
    frames: Res<SurfaceFrames>,
    config: Res<NavConfig>,
    clock: Res<NavClock>,
    mut pending: Local<Parallel<Vec<NavAgentEvent>>>,
    mut events: MessageWriter<NavAgentEvent>,
) {
    let outbox = &*pending;
    agents
        .par_iter_mut()
        .for_each(|(entity, mut agent, mut transform, jump, terrain_capable, stopped)| {
            let origin = frames.to_world(agent.surface, transform.translation + agent.offset);
            let layers = NavAgent::ground_layers(terrain_capable);

            match probe_ground(&*physics, &mut agent, origin, layers, &config) {
                GroundProbe::Hit(hit) => {
                    let surface = Some(hit.entity);
                    frames.reparent(agent.surface, surface, &mut transform);
                    agent.surface = surface;
                    agent.ground_normal = frames.vector_to_local(surface, hit.normal).normalize_or(Vec3::Y);
                    transform.translation.y = frames.to_local(surface, hit.point).y + agent.offset.y;

                    if let Some(target) = jump.filter(|_| agent.destination_surface == surface) {
                        transform.translation = target.0;
                    }
                    let resume = jump.is_some() && agent.has_destination() && !stopped;

                    par_commands.command_scope(|mut commands| {
                        let mut entity_commands = commands.entity(entity);
                        entity_commands.remove::<NavNeedsSurface>();
                        if jump.is_some() {
                            entity_commands.remove::<JumpBuffer>();
                        }
                        if resume {
                            entity_commands.insert(NavPlanning);
                        }
                    });
                    outbox.borrow_local_mut().push(NavAgentEvent {
                        agent: entity,
                        kind: NavEventKind::Landed,
                    });
                }
                GroundProbe::Miss { falling: true } => {
                    agent.fall_seconds = clock.elapsed_seconds;
                    debug!("{:?} lost its surface after {} misses; falling", entity, agent.surface_raycast_count);
                    par_commands.command_scope(|mut commands| {
                        commands
                            .entity(entity)
                            .remove::<NavNeedsSurface>()
                            .insert(NavFalling);
                    });
                    outbox.borrow_local_mut().push(NavAgentEvent {
                        agent: entity,
                        kind: NavEventKind::Fell,
                    });
                }
                GroundProbe::Miss { falling: false } => {}
            }
        });

    events.write_batch(pending.drain());
    profile_log!(clock, "[SURFACE] frames: {}", frames.len());
}
