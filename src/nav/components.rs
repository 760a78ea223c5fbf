/// Component definitions for the navigation layer.
///
/// Agents carry a [`NavAgent`] record plus status tags. Phases of the
/// locomotion state machine are expressed purely by which tags are present;
/// each pipeline stage selects its agents with query filters on those tags.
use bevy::prelude::*;
use smallvec::SmallVec;
use std::sync::Arc;

use super::navmesh::{NavMesh, PathQueryStatus};
use super::physics::layers;

// ============================================================================
// Agent
// ============================================================================

/// One navigating unit.
///
/// The agent's `Transform` is expressed in the local frame of `surface`
/// (world space when `surface` is `None`).
#[derive(Component, Debug, Clone)]
#[require(Transform, NavSteering)]
pub struct NavAgent {
    // Jumping
    pub jump_degrees: f32,
    pub jump_gravity: f32,
    pub jump_speed_multiplier_x: f32,
    pub jump_speed_multiplier_y: f32,

    // Motion
    pub translation_speed: f32,
    /// Seconds to turn fully toward the travel direction.
    pub rotation_speed: f32,
    /// Traversal class; selects bit `1 << type_id` of each polygon's mask.
    pub type_id: u8,
    /// Offset from the ground contact to the agent origin.
    ///
    /// `offset.y` must keep the grounding ray origin above the agent's own
    /// collision volume.
    pub offset: Vec3,

    // Surfaces and destination
    pub surface: Option<Entity>,
    /// Set if and only if a destination is active.
    pub destination_surface: Option<Entity>,
    pub local_destination: Vec3,
    pub destination_tolerance: f32,
    pub last_destination_seconds: Option<f64>,

    // Timers and counters
    pub jump_seconds: f64,
    /// Straight-line distance to the jump target at takeoff.
    pub jump_distance: f32,
    pub fall_seconds: f64,
    pub surface_raycast_count: u32,
    pub obstacle_replans: u32,
    /// Normal of the last surface hit, in surface-local space.
    pub ground_normal: Vec3,

    // Steering
    pub separation_perception_radius: f32,
    pub alignment_perception_radius: f32,
    pub cohesion_perception_radius: f32,
    pub obstacle_aversion_distance: f32,
}

impl Default for NavAgent {
    fn default() -> Self {
        Self {
            jump_degrees: 45.0,
            jump_gravity: 9.81,
            jump_speed_multiplier_x: 1.0,
            jump_speed_multiplier_y: 1.0,
            translation_speed: 5.0,
            rotation_speed: 0.3,
            type_id: 0,
            offset: Vec3::new(0.0, 1.0, 0.0),
            surface: None,
            destination_surface: None,
            local_destination: Vec3::ZERO,
            destination_tolerance: 1.0,
            last_destination_seconds: None,
            jump_seconds: 0.0,
            jump_distance: 0.0,
            fall_seconds: 0.0,
            surface_raycast_count: 0,
            obstacle_replans: 0,
            ground_normal: Vec3::Y,
            separation_perception_radius: 1.0,
            alignment_perception_radius: 3.0,
            cohesion_perception_radius: 3.0,
            obstacle_aversion_distance: 2.0,
        }
    }
}

impl NavAgent {
    pub fn has_destination(&self) -> bool {
        self.destination_surface.is_some()
    }

    pub fn clear_destination(&mut self) {
        self.destination_surface = None;
        self.obstacle_replans = 0;
    }

    /// Polygon mask bit for this agent's traversal class.
    pub fn traversal_mask(&self) -> u32 {
        1u32.checked_shl(self.type_id as u32).unwrap_or(0)
    }

    /// Collision layers this agent may stand on.
    pub fn ground_layers(terrain_capable: bool) -> u32 {
        if terrain_capable {
            layers::SURFACE | layers::TERRAIN
        } else {
            layers::SURFACE
        }
    }
}

// ============================================================================
// Status Tags
// ============================================================================

/// Following a path buffer on the current surface.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavWalking;

/// In a ballistic arc toward the jump buffer.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavJumping;

/// Lost the surface or missed a jump; only gravity applies.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavFalling;

/// Waiting for the planning stage.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavPlanning;

/// Airborne or freshly spawned; the surface stage looks for ground.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavNeedsSurface;

/// Planning failed. New destinations are ignored until this is removed.
#[derive(Component, Debug, Clone, Copy)]
pub struct NavProblem(pub PathQueryStatus);

/// Request to stop, observed by the control stage on the next tick.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavStop;

/// Agent may stand on terrain colliders as well as surfaces.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavTerrainCapable;

/// Agent takes part in separation/alignment/cohesion.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavFlocking;

/// Agent casts an obstacle ray fan while walking.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavObstacleSteering;

/// Motion is interpolated by external code; built-in locomotion skips the agent.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavCustomLerp;

/// Keep re-issuing destinations toward another agent.
#[derive(Component, Debug, Clone, Copy)]
pub struct NavFollow {
    pub target: Entity,
    pub min_distance: f32,
    /// Follow is cancelled beyond this distance. Zero or less disables the check.
    pub max_distance: f32,
    /// Copied onto every request this follow issues.
    pub tolerance: f32,
    pub custom_lerp: bool,
}

// ============================================================================
// Requests and Buffers
// ============================================================================

/// A pending destination, consumed by the destination stage.
///
/// An agent holds at most one; a newer request replaces one still waiting
/// out the rate limit.
#[derive(Component, Debug, Clone, Copy)]
pub struct DestinationRequest {
    pub world_point: Vec3,
    pub teleport: bool,
    pub tolerance: f32,
    pub custom_lerp: bool,
    pub issued_seconds: f64,
}

/// Surface-local waypoints, drained from the tail.
#[derive(Component, Debug, Clone, Default)]
pub struct PathBuffer(Vec<Vec3>);

impl PathBuffer {
    /// Build a buffer from waypoints in travel order.
    pub fn from_path(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut points: Vec<Vec3> = points.into_iter().collect();
        points.reverse();
        Self(points)
    }

    /// Next waypoint to walk toward.
    pub fn current(&self) -> Option<Vec3> {
        self.0.last().copied()
    }

    pub fn advance(&mut self) -> Option<Vec3> {
        self.0.pop()
    }

    /// Number of waypoints left, which doubles as the path index.
    pub fn remaining(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remaining waypoints in travel order.
    pub fn waypoints(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.0.iter().rev().copied()
    }
}

/// Ballistic target, local to the destination surface.
#[derive(Component, Debug, Clone, Copy)]
pub struct JumpBuffer(pub Vec3);

/// Per-tick steering vectors. Recomputed every tick, never carried over.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavSteering {
    pub collision_avoidance: Vec3,
    pub agent_avoidance: Vec3,
    pub separation: Vec3,
    pub cohesion: Vec3,
    pub alignment: Vec3,
    /// Final heading in the agent's surface-local frame. Zero when unset.
    pub heading: Vec3,
}

// ============================================================================
// Surfaces and Frames
// ============================================================================

/// A reference frame. Its `Transform` is relative to `parent` (world if `None`).
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavBasis {
    pub parent: Option<Entity>,
}

/// A body agents may stand on and parent to.
///
/// Its `Transform` is relative to `basis` (world if `None`).
#[derive(Component, Debug, Clone, Copy, Default)]
#[require(Transform)]
pub struct NavSurface {
    pub basis: Option<Entity>,
}

/// Surfaces reachable from this one by jumping.
#[derive(Component, Debug, Clone, Default)]
pub struct JumpableSurfaces(pub SmallVec<[Entity; 4]>);

impl JumpableSurfaces {
    pub fn contains(&self, surface: Entity) -> bool {
        self.0.contains(&surface)
    }
}

/// Navigation mesh tile for a surface, in the surface's local frame.
#[derive(Component, Debug, Clone)]
pub struct SurfaceMesh(pub Arc<NavMesh>);
