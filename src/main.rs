use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use rand::Rng;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use surfnav::nav::navmesh::{NavMesh, NavMeshDescription, NavMeshError};
use surfnav::nav::physics::{layers, NavCollider};
use surfnav::nav::*;

/// Ticks to run when no count is given on the command line.
const DEFAULT_SOAK_TICKS: u64 = 6000;
const AGENT_COUNT: usize = 40;
const DECK_HALF_SIZE: f32 = 8.0;
/// Centre of the rotating deck; leaves a 4 unit gap to the static one.
const SPINNER_CENTRE: Vec3 = Vec3::new(20.0, 0.0, 0.0);

fn setup_file_logging() -> std::io::Result<String> {
    let log_dir = Path::new("logs");
    fs::create_dir_all(log_dir)?;

    // Keep only the last 25 runs
    cleanup_old_logs(log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("surfnav_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(Rotation::NEVER, log_dir, &log_filename);
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,surfnav=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(log_path)
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|s| s.starts_with("surfnav") && s.ends_with(".log"))
        })
        .collect();

    // Oldest first
    log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

    if log_files.len() > keep_count {
        for file in log_files.iter().take(log_files.len() - keep_count) {
            let _ = fs::remove_file(file.path());
        }
    }
}

// ============================================================================
// Soak Scene
// ============================================================================

#[derive(Resource)]
struct SoakRun {
    ticks: u64,
}

#[derive(Resource, Default, Debug)]
struct SoakStats {
    arrived: u32,
    landed: u32,
    fell: u32,
    problems: u32,
}

/// Rotates a frame about its local Y axis.
#[derive(Component)]
struct Spin(f32);

/// Square deck mesh whose walkable face sits on top of its collider.
fn deck_mesh() -> Result<Arc<NavMesh>, NavMeshError> {
    let origin = Vec3::new(-DECK_HALF_SIZE, 0.5, -DECK_HALF_SIZE);
    let cells = (DECK_HALF_SIZE * 2.0) as u32;
    Ok(Arc::new(NavMeshDescription::grid(origin, 1.0, cells, cells).build()?))
}

fn setup_scene(mut commands: Commands) {
    let mesh = match deck_mesh() {
        Ok(mesh) => mesh,
        Err(e) => {
            error!("Failed to build deck navmesh: {}", e);
            return;
        }
    };
    // Collider overhangs the mesh edge so edge landings still find ground.
    let lip = DECK_HALF_SIZE + 0.25;
    let collider = NavCollider::cuboid(Vec3::new(lip, 0.5, lip), layers::SURFACE);

    let dock = commands
        .spawn((NavSurface::default(), Transform::IDENTITY, SurfaceMesh(mesh.clone()), collider))
        .id();
    let pivot = commands
        .spawn((NavBasis::default(), Transform::from_translation(SPINNER_CENTRE), Spin(0.1)))
        .id();
    let spinner = commands
        .spawn((
            NavSurface { basis: Some(pivot) },
            Transform::IDENTITY,
            SurfaceMesh(mesh),
            collider,
            JumpableSurfaces([dock].into_iter().collect()),
        ))
        .id();
    commands.entity(dock).insert(JumpableSurfaces([spinner].into_iter().collect()));

    commands.spawn((
        NavCollider::cuboid(Vec3::new(0.5, 1.0, 3.0), layers::OBSTACLE),
        Transform::from_xyz(0.0, 1.5, 0.0),
    ));

    let mut rng = rand::rng();
    for i in 0..AGENT_COUNT {
        let x = rng.random_range(-DECK_HALF_SIZE + 1.0..DECK_HALF_SIZE - 1.0);
        let z = rng.random_range(-DECK_HALF_SIZE + 1.0..DECK_HALF_SIZE - 1.0);
        let mut agent = commands.spawn((
            NavAgent {
                translation_speed: rng.random_range(3.0..6.0),
                ..default()
            },
            Transform::from_xyz(x, 3.0, z),
            NavNeedsSurface,
            NavObstacleSteering,
        ));
        if i % 2 == 0 {
            agent.insert(NavFlocking);
        }
    }
    info!("Spawned {} agents on two decks", AGENT_COUNT);
}

fn spin_frames(mut frames: Query<(&Spin, &mut Transform)>, config: Res<NavConfig>) {
    let dt = config.delta_seconds();
    for (spin, mut transform) in &mut frames {
        transform.rotate_local_y(spin.0 * dt);
    }
}

/// Random point over one of the two decks, in world space.
fn random_deck_point(rng: &mut impl Rng, frames: &SurfaceFrames, spinner: Option<Entity>) -> Vec3 {
    let local = Vec3::new(
        rng.random_range(-DECK_HALF_SIZE + 1.0..DECK_HALF_SIZE - 1.0),
        0.5,
        rng.random_range(-DECK_HALF_SIZE + 1.0..DECK_HALF_SIZE - 1.0),
    );
    match spinner {
        Some(surface) if rng.random_bool(0.3) => frames.to_world(Some(surface), local),
        _ => local,
    }
}

fn issue_random_destinations(
    agents: Query<Entity, (With<NavAgent>, Without<NavFalling>)>,
    surfaces: Query<(Entity, &NavSurface)>,
    frames: Res<SurfaceFrames>,
    clock: Res<NavClock>,
    mut destinations: MessageWriter<SetDestination>,
) {
    if clock.tick % 90 != 1 {
        return;
    }
    let spinner = surfaces.iter().find(|(_, s)| s.basis.is_some()).map(|(e, _)| e);
    let mut rng = rand::rng();
    for agent in &agents {
        if rng.random_bool(0.5) {
            let point = random_deck_point(&mut rng, &frames, spinner);
            destinations.write(SetDestination::new(agent, point));
        }
    }
}

/// Count notifications and put fallen or stuck agents back into play.
fn handle_agent_events(
    mut events: MessageReader<NavAgentEvent>,
    mut stats: ResMut<SoakStats>,
    mut destinations: MessageWriter<SetDestination>,
    mut clears: MessageWriter<ClearNavProblem>,
) {
    let mut rng = rand::rng();
    for event in events.read() {
        match event.kind {
            NavEventKind::Arrived => stats.arrived += 1,
            NavEventKind::Landed => stats.landed += 1,
            NavEventKind::Fell => {
                stats.fell += 1;
                let point = Vec3::new(rng.random_range(-4.0..4.0), 0.5, rng.random_range(-4.0..4.0));
                destinations.write(SetDestination {
                    teleport: true,
                    ..SetDestination::new(event.agent, point)
                });
            }
            NavEventKind::Problem(status) => {
                stats.problems += 1;
                debug!("{:?} reported {:?}; clearing", event.agent, status);
                clears.write(ClearNavProblem { agent: event.agent });
            }
        }
    }
}

fn log_status(agents: Query<NavStatus>, clock: Res<NavClock>, stats: Res<SoakStats>) {
    if clock.tick % 100 != 0 {
        return;
    }
    let mut totals = [0usize; 5];
    for item in &agents {
        let status = AgentStatus::from_item(&item);
        totals[0] += status.walking as usize;
        totals[1] += status.jumping as usize;
        totals[2] += status.falling as usize;
        totals[3] += status.planning as usize;
        totals[4] += status.problem.is_some() as usize;
    }
    info!(
        "tick {}: walking {} jumping {} falling {} planning {} problem {} | {:?}",
        clock.tick, totals[0], totals[1], totals[2], totals[3], totals[4], *stats
    );
}

fn stop_after_soak(clock: Res<NavClock>, run: Res<SoakRun>, stats: Res<SoakStats>, mut exit: MessageWriter<AppExit>) {
    if clock.tick >= run.ticks {
        info!("Soak finished after {} ticks: {:?}", clock.tick, *stats);
        exit.write(AppExit::Success);
    }
}

fn main() {
    let log_file = match setup_file_logging() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Failed to set up file logging: {}", e);
            return;
        }
    };
    println!("surfnav soak run, logging to {}", log_file);

    let ticks = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_SOAK_TICKS);

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))))
        .add_plugins((NavConfigPlugin, NavigationPlugin::default()))
        .insert_resource(SoakRun { ticks })
        .init_resource::<SoakStats>()
        .add_systems(Startup, setup_scene)
        .add_systems(FixedUpdate, spin_frames.before(NavSet::Sync))
        .add_systems(
            FixedUpdate,
            (issue_random_destinations, handle_agent_events)
                .chain()
                .after(NavSet::Control),
        )
        .add_systems(FixedUpdate, (log_status, stop_after_soak).chain().after(NavSet::Control))
        .run();
}
