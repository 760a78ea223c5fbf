use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default location of the navigation tuning file.
pub const NAV_CONFIG_PATH: &str = "assets/nav_config.ron";

/// Tuning constants for every navigation stage.
///
/// Loaded once at startup (see [`NavConfigPlugin`]) and handed to each stage
/// as `Res<NavConfig>`. Nothing in the pipeline reads process-wide state, so
/// a test can insert its own config before the first tick.
#[derive(Resource, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NavConfig {
    /// Navigation ticks per second. One tick advances the clock by `1 / tick_rate`.
    pub tick_rate: f64,

    // Destination resolution
    pub destination_rate_limit_seconds: f64,
    /// Radius of the sphere cast used to find the surface under a destination.
    pub destination_sphere_radius: f32,
    /// The sphere cast starts this far above the requested point.
    pub destination_cast_height: f32,
    pub destination_cast_distance: f32,

    // Surface tracking
    pub surface_raycast_distance: f32,
    /// Consecutive grounding misses before an agent is considered falling.
    pub surface_raycast_max: u32,

    // Planning
    pub path_search_max_iterations: u32,
    pub path_search_max_nodes: usize,
    pub path_search_extents: Vec3,
    pub straight_path_max: usize,
    pub corridor_max: usize,
    /// Height tolerance when checking whether a point still lies on a mesh.
    pub mesh_vertical_tolerance: f32,

    // Locomotion
    pub waypoint_tolerance: f32,
    pub jump_waypoint_tolerance: f32,
    pub jump_seconds_max: f64,
    pub obstacle_raycast_distance: f32,
    pub max_obstacle_replans: u32,

    // Steering
    pub flocking_cell_size: f32,
    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub agent_avoidance_weight: f32,
    pub obstacle_avoidance_weight: f32,
    pub obstacle_ray_count: u32,
    pub obstacle_ray_half_angle_degrees: f32,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30.0,
            destination_rate_limit_seconds: 0.8,
            destination_sphere_radius: 0.1,
            destination_cast_height: 1.0,
            destination_cast_distance: 1000.0,
            surface_raycast_distance: 1000.0,
            surface_raycast_max: 5,
            path_search_max_iterations: 1000,
            path_search_max_nodes: 1000,
            path_search_extents: Vec3::new(10.0, 10.0, 10.0),
            straight_path_max: 64,
            corridor_max: 256,
            mesh_vertical_tolerance: 1.0,
            waypoint_tolerance: 1.0,
            jump_waypoint_tolerance: 1.0,
            jump_seconds_max: 5.0,
            obstacle_raycast_distance: 1.0,
            max_obstacle_replans: 3,
            flocking_cell_size: 4.0,
            separation_weight: 1.0,
            alignment_weight: 0.5,
            cohesion_weight: 0.5,
            agent_avoidance_weight: 1.0,
            obstacle_avoidance_weight: 1.5,
            obstacle_ray_count: 5,
            obstacle_ray_half_angle_degrees: 45.0,
        }
    }
}

impl NavConfig {
    /// Seconds advanced by one navigation tick.
    pub fn delta_seconds(&self) -> f32 {
        (1.0 / self.tick_rate) as f32
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read navigation config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse navigation config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("tick_rate must be positive, got {0}")]
    TickRate(f64),
}

/// Read and validate a [`NavConfig`] from a RON file.
///
/// Missing fields take their default values.
pub fn load_nav_config(path: impl AsRef<Path>) -> Result<NavConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: NavConfig = ron::from_str(&contents)?;
    if config.tick_rate <= 0.0 {
        return Err(ConfigError::TickRate(config.tick_rate));
    }
    Ok(config)
}

/// Loads [`NavConfig`] from [`NAV_CONFIG_PATH`] at startup.
pub struct NavConfigPlugin;

impl Plugin for NavConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(PreStartup, load_config_from_disk);
    }
}

fn load_config_from_disk(mut commands: Commands, fixed_time: Option<ResMut<Time<Fixed>>>) {
    let config = match load_nav_config(NAV_CONFIG_PATH) {
        Ok(config) => {
            info!("Loaded navigation config from {}", NAV_CONFIG_PATH);
            config
        }
        Err(e) => {
            error!("{}", e);
            error!("Using default NavConfig");
            NavConfig::default()
        }
    };

    if let Some(mut fixed_time) = fixed_time {
        fixed_time.set_timestep_hz(config.tick_rate);
    }
    commands.insert_resource(config);
}
