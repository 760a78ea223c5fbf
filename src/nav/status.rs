use bevy::ecs::query::QueryData;
use bevy::prelude::*;

use super::components::*;
use super::navmesh::PathQueryStatus;

/// Read-only view of an agent's navigation state.
///
/// ```ignore
/// fn report(agents: Query<NavStatus>) {
///     for item in &agents {
///         let status = AgentStatus::from_item(&item);
///         if let Some(problem) = status.problem { /* ... */ }
///     }
/// }
/// ```
#[derive(QueryData)]
pub struct NavStatus {
    pub entity: Entity,
    pub agent: &'static NavAgent,
    pub walking: Has<NavWalking>,
    pub jumping: Has<NavJumping>,
    pub falling: Has<NavFalling>,
    pub planning: Has<NavPlanning>,
    pub needs_surface: Has<NavNeedsSurface>,
    pub problem: Option<&'static NavProblem>,
}

/// Plain copy of [`NavStatus`] that can outlive the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AgentStatus {
    pub walking: bool,
    pub jumping: bool,
    pub falling: bool,
    pub planning: bool,
    pub needs_surface: bool,
    pub problem: Option<PathQueryStatus>,
    pub surface: Option<Entity>,
    pub destination_surface: Option<Entity>,
}

impl AgentStatus {
    pub fn from_item(item: &NavStatusItem) -> Self {
        Self {
            walking: item.walking,
            jumping: item.jumping,
            falling: item.falling,
            planning: item.planning,
            needs_surface: item.needs_surface,
            problem: item.problem.map(|p| p.0),
            surface: item.agent.surface,
            destination_surface: item.agent.destination_surface,
        }
    }

    /// Read the status of one agent directly from a world.
    pub fn of(world: &World, agent: Entity) -> Option<Self> {
        let entity = world.get_entity(agent).ok()?;
        let nav = entity.get::<NavAgent>()?;
        Some(Self {
            walking: entity.contains::<NavWalking>(),
            jumping: entity.contains::<NavJumping>(),
            falling: entity.contains::<NavFalling>(),
            planning: entity.contains::<NavPlanning>(),
            needs_surface: entity.contains::<NavNeedsSurface>(),
            problem: entity.get::<NavProblem>().map(|p| p.0),
            surface: nav.surface,
            destination_surface: nav.destination_surface,
        })
    }

    /// Number of motion tags set. Never more than one at a tick boundary.
    pub fn motion_tags(&self) -> usize {
        self.walking as usize + self.jumping as usize + self.falling as usize
    }
}
