//! Locomotion and pathfinding for agents on moving surfaces.
//!
//! This module is organized into:
//! - **components**: agent record, status tags, surfaces and buffers
//! - **resources**: navigation clock and surface frames
//! - **events**: caller requests and agent notifications
//! - **physics**: the ray/sphere cast boundary
//! - **navmesh**: mesh tiles, corridor search and the funnel
//! - **spatial_hash**: flocking neighbour grid
//! - **systems**: one module per pipeline stage
//!
//! Each tick runs the stages in a fixed order. Within a stage agents are
//! processed in parallel and every structural change (tags, buffers) goes
//! through commands that are applied before the next stage starts.

use bevy::ecs::schedule::{InternedScheduleLabel, ScheduleLabel};
use bevy::prelude::*;

pub mod components;
pub mod config;
pub mod events;
pub mod math;
pub mod navmesh;
pub mod physics;
pub mod resources;
pub mod spatial_hash;
pub mod status;
pub mod systems;

pub use components::*;
pub use config::{load_nav_config, ConfigError, NavConfig, NavConfigPlugin};
pub use events::*;
pub use resources::*;
pub use status::{AgentStatus, NavStatus};

use navmesh::NavQueryPool;
use physics::CollisionWorld;
use spatial_hash::FlockingHash;

/// Pipeline stages, run in this order every tick.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum NavSet {
    Sync,          // Clock, surface frames, collision snapshot
    Input,         // Caller messages into components
    Surface,       // Grounding and fall detection
    Destination,   // World points into surface-local destinations
    Planning,      // Corridor search, funnel and jump targets
    Steering,      // Flocking and obstacle avoidance
    Interpolation, // Walking, jumping and falling
    Control,       // Stop and follow
}

/// Adds the navigation pipeline to an app.
///
/// Runs in `FixedUpdate` by default. Hosts that step navigation themselves
/// can use [`NavigationPlugin::in_schedule`]; with `Update`, one
/// `app.update()` is exactly one navigation tick.
pub struct NavigationPlugin {
    schedule: InternedScheduleLabel,
}

impl Default for NavigationPlugin {
    fn default() -> Self {
        Self {
            schedule: FixedUpdate.intern(),
        }
    }
}

impl NavigationPlugin {
    pub fn in_schedule(schedule: impl ScheduleLabel) -> Self {
        Self {
            schedule: schedule.intern(),
        }
    }
}

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<NavConfig>() {
            app.init_resource::<NavConfig>();
        }
        if self.schedule == FixedUpdate.intern() {
            let tick_rate = app.world().resource::<NavConfig>().tick_rate;
            app.insert_resource(Time::<Fixed>::from_hz(tick_rate));
        }

        app.init_resource::<NavClock>();
        app.init_resource::<SurfaceFrames>();
        app.init_resource::<CollisionWorld>();
        app.init_resource::<FlockingHash>();
        app.init_resource::<NavQueryPool>();

        app.add_message::<SetDestination>();
        app.add_message::<StopAgent>();
        app.add_message::<FollowAgent>();
        app.add_message::<ClearNavProblem>();
        app.add_message::<NavAgentEvent>();

        app.configure_sets(
            self.schedule,
            (
                NavSet::Sync,
                NavSet::Input,
                NavSet::Surface,
                NavSet::Destination,
                NavSet::Planning,
                NavSet::Steering,
                NavSet::Interpolation,
                NavSet::Control,
            )
                .chain(),
        );

        app.add_systems(
            self.schedule,
            (
                (
                    systems::frames::advance_clock,
                    systems::frames::rebuild_surface_frames,
                    physics::rebuild_collision_world,
                )
                    .chain()
                    .in_set(NavSet::Sync),
                (
                    systems::input::process_destination_requests,
                    systems::input::process_stop_requests,
                    systems::input::process_follow_requests,
                    systems::input::process_problem_clears,
                )
                    .in_set(NavSet::Input),
                systems::surface::track_surfaces.in_set(NavSet::Surface),
                systems::destination::resolve_destinations.in_set(NavSet::Destination),
                (systems::planning::plan_paths, systems::planning::plan_jumps).in_set(NavSet::Planning),
                (
                    systems::steering::rebuild_flocking_hash,
                    systems::steering::compute_steering,
                )
                    .chain()
                    .in_set(NavSet::Steering),
                (
                    systems::interpolation::walk_agents,
                    systems::interpolation::jump_agents,
                    systems::interpolation::fall_agents,
                )
                    .in_set(NavSet::Interpolation),
                (systems::control::stop_agents, systems::control::follow_agents)
                    .chain()
                    .in_set(NavSet::Control),
            ),
        );
    }
}
