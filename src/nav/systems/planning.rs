use bevy::prelude::*;
use bevy::utils::Parallel;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use surfnav_macros::profile;

use crate::nav::components::*;
use crate::nav::config::NavConfig;
use crate::nav::events::{NavAgentEvent, NavEventKind};
use crate::nav::navmesh::{
    find_straight_path, NavMesh, NavMeshLocation, NavMeshQuery, NavQueryPool, PathQueryStatus, StraightPathFlags,
    StraightPathPoint,
};
use crate::nav::resources::{NavClock, SurfaceFrames};
use crate::profile_log;

// ============================================================================
// Path Search
// ============================================================================

/// Snap a point onto the mesh, falling back to the closest point anywhere on it.
fn locate(mesh: &NavMesh, point: Vec3, mask: u32, config: &NavConfig) -> Option<NavMeshLocation> {
    mesh.map_location(point, config.path_search_extents, mask)
        .or_else(|| mesh.nearest_location(point, mask))
}

/// Corridor search plus funnel reduction between two points on one tile.
///
/// Runs at most `path_search_max_iterations` expansions; a search that has not
/// succeeded by then is reported as the error. A corridor that stops short of
/// the goal ends at the closest point of its last polygon.
pub fn plan_straight_path(
    query: &mut NavMeshQuery,
    mesh: &Arc<NavMesh>,
    start: Vec3,
    end: Vec3,
    mask: u32,
    config: &NavConfig,
) -> Result<Vec<StraightPathPoint>, PathQueryStatus> {
    let invalid = PathQueryStatus::FAILURE | PathQueryStatus::INVALID_PARAM;
    let start = locate(mesh, start, mask, config).ok_or(invalid)?;
    let end = locate(mesh, end, mask, config).ok_or(invalid)?;

    let status = query.begin_find_path(mesh, start, end, mask);
    if status.is_failure() {
        return Err(status);
    }
    let (status, _) = query.update_find_path(config.path_search_max_iterations);
    if !status.is_success() {
        return Err(status);
    }

    let (status, corridor) = query.end_find_path(config.corridor_max);
    let last = *corridor.last().ok_or(invalid)?;
    let goal = if last == end.poly {
        end.point
    } else {
        mesh.closest_point(last, end.point).ok_or(invalid)?
    };
    let portals = mesh.corridor_portals(&corridor).ok_or(invalid)?;

    let (funnel_status, points) = find_straight_path(start.point, goal, &portals, config.straight_path_max);
    if !funnel_status.is_success() {
        return Err(funnel_status);
    }
    if status.contains(PathQueryStatus::PARTIAL_RESULT) {
        trace!("Partial corridor of {} polygons", corridor.len());
    }
    Ok(points)
}

/// Last point along a reversed path that still stands on the mesh.
pub fn last_point_on_mesh(mesh: &NavMesh, points: &[StraightPathPoint], vertical_tolerance: f32) -> Option<Vec3> {
    points
        .iter()
        .take_while(|p| mesh.contains_point(p.position, vertical_tolerance))
        .last()
        .map(|p| p.position)
}

fn report_problem(
    par_commands: &ParallelCommands,
    outbox: &Parallel<Vec<NavAgentEvent>>,
    entity: Entity,
    agent: &mut NavAgent,
    status: PathQueryStatus,
) {
    warn!("Planning failed for {:?}: {:?}", entity, status);
    agent.clear_destination();
    par_commands.command_scope(|mut commands| {
        commands
            .entity(entity)
            .remove::<(NavPlanning, NavWalking, NavJumping, PathBuffer, JumpBuffer)>()
            .insert(NavProblem(status));
    });
    outbox.borrow_local_mut().push(NavAgentEvent {
        agent: entity,
        kind: NavEventKind::Problem(status),
    });
}

// ============================================================================
// Systems
// ============================================================================

/// Plan a walking path on the agent's current surface toward its destination.
///
/// Destinations on another surface are clamped onto the current tile, so the
/// path ends at the edge closest to them and locomotion decides whether to jump.
#[profile]
pub fn plan_paths(
    par_commands: ParallelCommands,
    mut agents: Query<
        (Entity, &mut NavAgent, &Transform),
        (With<NavPlanning>, Without<NavJumping>, Without<NavFalling>, Without<NavNeedsSurface>),
    >,
    meshes: Query<&SurfaceMesh>,
    pool: Res<NavQueryPool>,
    frames: Res<SurfaceFrames>,
    config: Res<NavConfig>,
    clock: Res<NavClock>,
    mut pending: Local<Parallel<Vec<NavAgentEvent>>>,
    mut events: MessageWriter<NavAgentEvent>,
) {
    let outbox = &*pending;
    let planned_count = AtomicUsize::new(0);
    agents.par_iter_mut().for_each(|(entity, mut agent, transform)| {
        if !agent.has_destination() {
            par_commands.command_scope(|mut commands| {
                commands.entity(entity).remove::<NavPlanning>();
            });
            return;
        }
        let Some(surface) = agent.surface else {
            par_commands.command_scope(|mut commands| {
                commands.entity(entity).insert(NavNeedsSurface);
            });
            return;
        };
        let Ok(SurfaceMesh(mesh)) = meshes.get(surface) else {
            report_problem(
                &par_commands,
                outbox,
                entity,
                &mut agent,
                PathQueryStatus::FAILURE | PathQueryStatus::INVALID_PARAM,
            );
            return;
        };

        let start = transform.translation - agent.offset;
        let end = frames.reframe(agent.destination_surface, Some(surface), agent.local_destination - agent.offset);
        let mask = agent.traversal_mask();
        let planned = pool.scope(config.path_search_max_nodes, |query| {
            plan_straight_path(query, mesh, start, end, mask, &config)
        });

        match planned {
            Ok(points) => {
                planned_count.fetch_add(1, Ordering::Relaxed);
                let offset = agent.offset;
                let path = PathBuffer::from_path(
                    points
                        .iter()
                        .filter(|p| !p.flags.contains(StraightPathFlags::START))
                        .map(|p| p.position + offset),
                );
                par_commands.command_scope(|mut commands| {
                    commands
                        .entity(entity)
                        .remove::<NavPlanning>()
                        .insert((path, NavWalking));
                });
            }
            Err(status) => report_problem(&par_commands, outbox, entity, &mut agent, status),
        }
    });

    events.write_batch(pending.drain());
    profile_log!(clock, "[PLANNING] paths planned: {}", planned_count.load(Ordering::Relaxed));
}

/// Find the jump target for agents that walked off the end of their path.
///
/// Searches the destination tile backwards, from the destination toward the
/// agent, and takes the last funnel vertex still on that tile. The agent then
/// leaves its surface for the world frame until it lands.
#[profile]
pub fn plan_jumps(
    par_commands: ParallelCommands,
    mut agents: Query<(Entity, &mut NavAgent, &mut Transform), (With<NavPlanning>, With<NavJumping>)>,
    meshes: Query<&SurfaceMesh>,
    pool: Res<NavQueryPool>,
    frames: Res<SurfaceFrames>,
    config: Res<NavConfig>,
    clock: Res<NavClock>,
    mut pending: Local<Parallel<Vec<NavAgentEvent>>>,
    mut events: MessageWriter<NavAgentEvent>,
) {
    let outbox = &*pending;
    let planned_count = AtomicUsize::new(0);
    agents.par_iter_mut().for_each(|(entity, mut agent, mut transform)| {
        let Some(destination_surface) = agent.destination_surface else {
            par_commands.command_scope(|mut commands| {
                commands
                    .entity(entity)
                    .remove::<(NavPlanning, NavJumping)>()
                    .insert(NavNeedsSurface);
            });
            return;
        };
        let Ok(SurfaceMesh(mesh)) = meshes.get(destination_surface) else {
            report_problem(
                &par_commands,
                outbox,
                entity,
                &mut agent,
                PathQueryStatus::FAILURE | PathQueryStatus::INVALID_PARAM,
            );
            return;
        };

        let destination = Some(destination_surface);
        let start = agent.local_destination - agent.offset;
        let end = frames.reframe(agent.surface, destination, transform.translation - agent.offset);
        let mask = agent.traversal_mask();
        let planned = pool.scope(config.path_search_max_nodes, |query| {
            plan_straight_path(query, mesh, start, end, mask, &config)
        });

        let target = match planned {
            Ok(points) => last_point_on_mesh(mesh, &points, config.mesh_vertical_tolerance),
            Err(status) => {
                report_problem(&par_commands, outbox, entity, &mut agent, status);
                return;
            }
        };
        let Some(target) = target else {
            report_problem(&par_commands, outbox, entity, &mut agent, PathQueryStatus::FAILURE);
            return;
        };

        planned_count.fetch_add(1, Ordering::Relaxed);
        let landing = target + agent.offset;
        let takeoff = frames.to_world(agent.surface, transform.translation);
        agent.jump_distance = takeoff.distance(frames.to_world(destination, landing));
        frames.reparent(agent.surface, None, &mut transform);
        agent.surface = None;

        par_commands.command_scope(|mut commands| {
            commands
                .entity(entity)
                .remove::<NavPlanning>()
                .insert(JumpBuffer(landing));
        });
    });

    events.write_batch(pending.drain());
    profile_log!(clock, "[PLANNING] jumps planned: {}", planned_count.load(Ordering::Relaxed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::navmesh::NavMeshDescription;

    fn plain(cols: u32, rows: u32) -> Arc<NavMesh> {
        Arc::new(NavMeshDescription::grid(Vec3::ZERO, 1.0, cols, rows).build().unwrap())
    }

    #[test]
    fn test_straight_path_across_grid() {
        let mesh = plain(6, 1);
        let mut query = NavMeshQuery::default();
        let points = plan_straight_path(
            &mut query,
            &mesh,
            Vec3::new(0.5, 0.0, 0.5),
            Vec3::new(5.5, 0.0, 0.5),
            1,
            &NavConfig::default(),
        )
        .unwrap();
        assert_eq!(points.len(), 2);
        assert!(points[0].flags.contains(StraightPathFlags::START));
        assert!(points[1].flags.contains(StraightPathFlags::END));
        assert!((points[1].position - Vec3::new(5.5, 0.0, 0.5)).length() < 1e-5);
    }

    #[test]
    fn test_off_tile_goal_is_clamped_to_edge() {
        let mesh = plain(4, 1);
        let mut query = NavMeshQuery::default();
        let points = plan_straight_path(
            &mut query,
            &mesh,
            Vec3::new(0.5, 0.0, 0.5),
            Vec3::new(30.0, 0.0, 0.5),
            1,
            &NavConfig::default(),
        )
        .unwrap();
        let end = points.last().unwrap().position;
        assert!((end - Vec3::new(4.0, 0.0, 0.5)).length() < 1e-4, "{end:?}");
    }

    #[test]
    fn test_iteration_cap_is_an_error() {
        let mesh = plain(20, 1);
        let mut query = NavMeshQuery::default();
        let config = NavConfig { path_search_max_iterations: 2, ..Default::default() };
        let result = plan_straight_path(
            &mut query,
            &mesh,
            Vec3::new(0.5, 0.0, 0.5),
            Vec3::new(19.5, 0.0, 0.5),
            1,
            &config,
        );
        let status = result.unwrap_err();
        assert!(status.is_in_progress());
    }

    #[test]
    fn test_wrong_traversal_class_is_invalid() {
        let mut description = NavMeshDescription::grid(Vec3::ZERO, 1.0, 2, 1);
        for polygon in &mut description.polygons {
            polygon.mask = 1 << 1;
        }
        let mesh = Arc::new(description.build().unwrap());
        let mut query = NavMeshQuery::default();
        let status = plan_straight_path(
            &mut query,
            &mesh,
            Vec3::new(0.5, 0.0, 0.5),
            Vec3::new(1.5, 0.0, 0.5),
            1,
            &NavConfig::default(),
        )
        .unwrap_err();
        assert!(status.is_failure());
        assert!(status.contains(PathQueryStatus::INVALID_PARAM));
    }

    #[test]
    fn test_last_point_on_mesh_stops_at_first_off_mesh_vertex() {
        let mesh = plain(2, 2);
        let point = |x: f32, y: f32| StraightPathPoint {
            position: Vec3::new(x, y, 1.0),
            flags: StraightPathFlags::NONE,
        };
        let points = [point(0.5, 0.0), point(1.5, 0.0), point(3.0, 0.0), point(1.0, 0.0)];
        assert_eq!(last_point_on_mesh(&mesh, &points, 0.5), Some(Vec3::new(1.5, 0.0, 1.0)));

        let raised = [point(0.5, 4.0)];
        assert_eq!(last_point_on_mesh(&mesh, &raised, 0.5), None);
    }

    #[test]
    fn test_plan_paths_fills_buffer_in_agent_frame() {
        let mut app = App::new();
        app.init_resource::<NavQueryPool>();
        app.init_resource::<SurfaceFrames>();
        app.init_resource::<NavConfig>();
        app.init_resource::<NavClock>();
        app.add_message::<NavAgentEvent>();
        app.add_systems(Update, plan_paths);

        let surface = app.world_mut().spawn((NavSurface::default(), SurfaceMesh(plain(6, 1)))).id();
        let agent = app
            .world_mut()
            .spawn((
                NavAgent {
                    surface: Some(surface),
                    destination_surface: Some(surface),
                    local_destination: Vec3::new(5.5, 1.0, 0.5),
                    ..Default::default()
                },
                Transform::from_xyz(0.5, 1.0, 0.5),
                NavPlanning,
            ))
            .id();

        app.update();

        let world = app.world();
        assert!(world.get::<NavPlanning>(agent).is_none());
        assert!(world.get::<NavWalking>(agent).is_some());
        let path: Vec<Vec3> = world.get::<PathBuffer>(agent).unwrap().waypoints().collect();
        assert_eq!(path.len(), 1);
        assert!((path[0] - Vec3::new(5.5, 1.0, 0.5)).length() < 1e-5);
    }

    #[test]
    fn test_plan_paths_without_mesh_is_a_problem() {
        let mut app = App::new();
        app.init_resource::<NavQueryPool>();
        app.init_resource::<SurfaceFrames>();
        app.init_resource::<NavConfig>();
        app.init_resource::<NavClock>();
        app.add_message::<NavAgentEvent>();
        app.add_systems(Update, plan_paths);

        let surface = app.world_mut().spawn(NavSurface::default()).id();
        let agent = app
            .world_mut()
            .spawn((
                NavAgent {
                    surface: Some(surface),
                    destination_surface: Some(surface),
                    ..Default::default()
                },
                NavPlanning,
            ))
            .id();

        app.update();

        let world = app.world();
        assert!(world.get::<NavProblem>(agent).is_some());
        assert!(world.get::<NavPlanning>(agent).is_none());
        assert!(!world.get::<NavAgent>(agent).unwrap().has_destination());
    }
}
