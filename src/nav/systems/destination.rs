use bevy::prelude::*;
use surfnav_macros::profile;

use crate::nav::components::*;
use crate::nav::config::NavConfig;
use crate::nav::physics::{CollisionWorld, SpatialQuery};
use crate::nav::resources::{NavClock, SurfaceFrames};
use crate::profile_log;

/// A destination expressed on the surface found under it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedDestination {
    pub surface: Entity,
    /// Requested point in the surface's local frame, agent offset applied.
    pub local_point: Vec3,
}

/// Whether a request must wait for the rate limit to expire.
pub fn rate_limited(last_destination_seconds: Option<f64>, now: f64, limit_seconds: f64) -> bool {
    last_destination_seconds.is_some_and(|last| now - last < limit_seconds)
}

/// Find the surface under `world_point` with a short downward sphere cast.
pub fn resolve_destination<Q: SpatialQuery + ?Sized>(
    physics: &Q,
    frames: &SurfaceFrames,
    world_point: Vec3,
    offset: Vec3,
    layers: u32,
    config: &NavConfig,
) -> Option<ResolvedDestination> {
    let origin = world_point + Vec3::Y * config.destination_cast_height;
    let hit = physics.cast_sphere(
        origin,
        config.destination_sphere_radius,
        Vec3::NEG_Y,
        config.destination_cast_distance,
        layers,
    )?;
    let surface = Some(hit.entity);
    Some(ResolvedDestination {
        surface: hit.entity,
        local_point: frames.to_local(surface, world_point) + offset,
    })
}

/// Turn pending [`DestinationRequest`]s into surface-local destinations.
///
/// Rate-limited requests and walking requests for airborne agents stay on
/// the agent and are retried next tick. Teleports are applied in place; every
/// other accepted request starts planning unless it repeats the active
/// destination.
#[profile]
pub fn resolve_destinations(
    par_commands: ParallelCommands,
    mut agents: Query<(
        Entity,
        &mut NavAgent,
        &mut Transform,
        &DestinationRequest,
        Has<NavProblem>,
        Has<NavTerrainCapable>,
        Has<NavJumping>,
        Has<NavFalling>,
        Has<NavNeedsSurface>,
    )>,
    physics: Res<CollisionWorld>,
    frames: Res<SurfaceFrames>,
    config: Res<NavConfig>,
    clock: Res<NavClock>,
) {
    let now = clock.elapsed_seconds;
    agents.par_iter_mut().for_each(
        |(entity, mut agent, mut transform, request, problem, terrain_capable, jumping, falling, needs_surface)| {
            if problem {
                debug!("Destination for {:?} dropped: agent has an unresolved navigation problem", entity);
                par_commands.command_scope(|mut commands| {
                    commands.entity(entity).remove::<DestinationRequest>();
                });
                return;
            }
            let airborne = jumping || falling || needs_surface;
            if airborne && !request.teleport {
                return;
            }
            if rate_limited(agent.last_destination_seconds, now, config.destination_rate_limit_seconds) {
                return;
            }

            let layers = NavAgent::ground_layers(terrain_capable);
            let Some(resolved) =
                resolve_destination(&*physics, &frames, request.world_point, agent.offset, layers, &config)
            else {
                debug!("Destination {:?} for {:?} has no surface beneath it", request.world_point, entity);
                par_commands.command_scope(|mut commands| {
                    commands.entity(entity).remove::<DestinationRequest>();
                });
                return;
            };
            let surface = Some(resolved.surface);

            if request.teleport {
                frames.reparent(agent.surface, surface, &mut transform);
                transform.translation = resolved.local_point;
                agent.surface = surface;
                agent.clear_destination();
                agent.last_destination_seconds = Some(now);
                agent.ground_normal = Vec3::Y;
                agent.surface_raycast_count = 0;
                par_commands.command_scope(|mut commands| {
                    commands
                        .entity(entity)
                        .remove::<(
                            DestinationRequest,
                            NavWalking,
                            NavPlanning,
                            NavJumping,
                            NavFalling,
                            NavNeedsSurface,
                            PathBuffer,
                            JumpBuffer,
                        )>();
                });
                return;
            }

            let unchanged = agent.destination_surface == surface
                && agent.local_destination.distance(resolved.local_point) <= request.tolerance;
            if unchanged {
                par_commands.command_scope(|mut commands| {
                    commands.entity(entity).remove::<DestinationRequest>();
                });
                return;
            }

            agent.destination_surface = surface;
            agent.local_destination = resolved.local_point;
            agent.destination_tolerance = request.tolerance;
            agent.last_destination_seconds = Some(now);
            agent.obstacle_replans = 0;

            let custom_lerp = request.custom_lerp;
            par_commands.command_scope(|mut commands| {
                let mut entity_commands = commands.entity(entity);
                entity_commands.remove::<DestinationRequest>().insert(NavPlanning);
                if custom_lerp {
                    entity_commands.insert(NavCustomLerp);
                } else {
                    entity_commands.remove::<NavCustomLerp>();
                }
            });
        },
    );

    profile_log!(clock, "[DESTINATION] colliders: {}", physics.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Affine3A;
    use crate::nav::physics::{layers, ColliderShape, WorldCollider};

    fn deck(to_world: Affine3A) -> (CollisionWorld, SurfaceFrames, Entity) {
        let surface = Entity::from_bits(7);
        let mut world = CollisionWorld::default();
        world.push(WorldCollider::new(
            surface,
            ColliderShape::Cuboid { half_extents: Vec3::new(10.0, 0.5, 10.0) },
            layers::SURFACE,
            to_world,
        ));
        let mut frames = SurfaceFrames::default();
        frames.insert(surface, to_world);
        (world, frames, surface)
    }

    #[test]
    fn test_rate_limit_window() {
        assert!(!rate_limited(None, 0.0, 0.8));
        assert!(rate_limited(Some(1.0), 1.5, 0.8));
        assert!(!rate_limited(Some(1.0), 1.8, 0.8));
    }

    #[test]
    fn test_destination_is_local_to_hit_surface() {
        let (world, frames, surface) = deck(Affine3A::from_translation(Vec3::new(100.0, 0.0, 0.0)));
        let config = NavConfig::default();
        let offset = Vec3::new(0.0, 1.0, 0.0);

        let resolved =
            resolve_destination(&world, &frames, Vec3::new(103.0, 0.5, -2.0), offset, layers::SURFACE, &config)
                .unwrap();
        assert_eq!(resolved.surface, surface);
        assert!((resolved.local_point - Vec3::new(3.0, 1.5, -2.0)).length() < 1e-5);
    }

    #[test]
    fn test_destination_over_void_is_unresolved() {
        let (world, frames, _) = deck(Affine3A::IDENTITY);
        let config = NavConfig::default();
        let resolved =
            resolve_destination(&world, &frames, Vec3::new(50.0, 0.5, 0.0), Vec3::ZERO, layers::SURFACE, &config);
        assert!(resolved.is_none());
    }

    #[test]
    fn test_request_is_deferred_while_rate_limited() {
        let (world, frames, surface) = deck(Affine3A::IDENTITY);
        let mut app = App::new();
        app.insert_resource(world);
        app.insert_resource(frames);
        app.insert_resource(NavConfig::default());
        app.insert_resource(NavClock { tick: 3, elapsed_seconds: 1.0, delta_seconds: 0.1 });
        app.add_systems(Update, resolve_destinations);

        let agent = app
            .world_mut()
            .spawn((
                NavAgent {
                    surface: Some(surface),
                    last_destination_seconds: Some(0.5),
                    ..Default::default()
                },
                DestinationRequest {
                    world_point: Vec3::new(2.0, 0.5, 2.0),
                    teleport: false,
                    tolerance: 0.5,
                    custom_lerp: false,
                    issued_seconds: 1.0,
                },
            ))
            .id();

        app.update();
        assert!(app.world().get::<DestinationRequest>(agent).is_some());
        assert!(app.world().get::<NavPlanning>(agent).is_none());

        app.world_mut().resource_mut::<NavClock>().elapsed_seconds = 2.0;
        app.update();
        assert!(app.world().get::<DestinationRequest>(agent).is_none());
        assert!(app.world().get::<NavPlanning>(agent).is_some());
        let nav = app.world().get::<NavAgent>(agent).unwrap();
        assert_eq!(nav.destination_surface, Some(surface));
        assert_eq!(nav.last_destination_seconds, Some(2.0));
    }
    #[test]
    fn test_custom_lerp_tag_follows_latest_request() {
        let (world, frames, surface) = deck(Affine3A::IDENTITY);
        let mut app = App::new();
        app.insert_resource(world);
        app.insert_resource(frames);
        app.insert_resource(NavConfig::default());
        app.insert_resource(NavClock { tick: 3, elapsed_seconds: 1.0, delta_seconds: 0.1 });
        app.add_systems(Update, resolve_destinations);

        let request = DestinationRequest {
            world_point: Vec3::new(2.0, 0.5, 2.0),
            teleport: false,
            tolerance: 0.5,
            custom_lerp: true,
            issued_seconds: 1.0,
        };
        let agent = app
            .world_mut()
            .spawn((NavAgent { surface: Some(surface), ..Default::default() }, request))
            .id();

        app.update();
        assert!(app.world().get::<NavCustomLerp>(agent).is_some());
        assert!(app.world().get::<NavPlanning>(agent).is_some());

        app.world_mut().resource_mut::<NavClock>().elapsed_seconds = 3.0;
        app.world_mut().entity_mut(agent).insert(DestinationRequest {
            world_point: Vec3::new(-4.0, 0.5, 1.0),
            custom_lerp: false,
            issued_seconds: 3.0,
            ..request
        });
        app.update();
        assert!(app.world().get::<DestinationRequest>(agent).is_none());
        assert!(app.world().get::<NavCustomLerp>(agent).is_none());
        assert!(app.world().get::<NavPlanning>(agent).is_some());
    }
}
