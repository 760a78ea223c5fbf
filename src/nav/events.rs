/// Messages exchanged with the navigation layer.
///
/// Callers write the request messages; the input stage turns them into
/// components on the agent. Stages report notable transitions back through
/// [`NavAgentEvent`].
use bevy::prelude::*;

use super::navmesh::PathQueryStatus;

// ============================================================================
// Requests
// ============================================================================

/// Move an agent to a world-space point.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct SetDestination {
    pub agent: Entity,
    pub world_point: Vec3,
    pub tolerance: f32,
    /// Place the agent at the destination instead of walking there.
    pub teleport: bool,
    pub custom_lerp: bool,
}

impl SetDestination {
    pub fn new(agent: Entity, world_point: Vec3) -> Self {
        Self {
            agent,
            world_point,
            tolerance: 0.5,
            teleport: false,
            custom_lerp: false,
        }
    }
}

/// Cancel whatever the agent is doing once it is safely grounded.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct StopAgent {
    pub agent: Entity,
}

/// Keep walking toward another agent.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct FollowAgent {
    pub agent: Entity,
    pub target: Entity,
    pub min_distance: f32,
    pub max_distance: f32,
    pub tolerance: f32,
    pub custom_lerp: bool,
}

/// Acknowledge a planning problem so the agent accepts destinations again.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct ClearNavProblem {
    pub agent: Entity,
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavEventKind {
    /// Walked to the end of the path at the destination.
    Arrived,
    /// Found ground after a jump or fall.
    Landed,
    /// Entered the falling state.
    Fell,
    /// Planning failed with this status.
    Problem(PathQueryStatus),
}

#[derive(Event, Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavAgentEvent {
    pub agent: Entity,
    pub kind: NavEventKind,
}
