use bevy::prelude::*;
use std::ops::BitOr;

use super::query::PathQueryStatus;
use super::Portal;
use crate::nav::math::{same_xz, tri_area_xz, VERTEX_EPSILON_SQ};

/// Per-vertex flags on a straight path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StraightPathFlags(pub u8);

impl StraightPathFlags {
    pub const NONE: Self = Self(0);
    pub const START: Self = Self(1 << 0);
    pub const END: Self = Self(1 << 1);
    /// Vertex sits at the start or end of an off-mesh link.
    pub const OFFMESH_CONNECTION: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StraightPathFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightPathPoint {
    pub position: Vec3,
    pub flags: StraightPathFlags,
}

/// Appends a vertex, merging it into the previous one when they coincide.
///
/// Returns `false` once the output is full.
fn append(points: &mut Vec<StraightPathPoint>, position: Vec3, flags: StraightPathFlags, max_points: usize) -> bool {
    if let Some(last) = points.last_mut() {
        if last.position.distance_squared(position) < VERTEX_EPSILON_SQ {
            last.flags = last.flags | flags;
            return true;
        }
    }
    if points.len() >= max_points {
        return false;
    }
    points.push(StraightPathPoint { position, flags });
    true
}

/// Reduce a portal corridor to the shortest polyline inside it.
///
/// `portals` are the shared edges between consecutive corridor polygons,
/// oriented in travel direction. The funnel keeps an apex and a left and
/// right bound; a portal that narrows a bound moves it, and a portal that
/// crosses over the opposite bound commits that bound as a corner and
/// restarts the scan from it.
///
/// Forced portals (polygon kind changes, e.g. entering an off-mesh link)
/// always become a vertex flagged `OFFMESH_CONNECTION`.
///
/// The output holds at most `max_points` vertices; a truncated path is
/// reported with `BUFFER_TOO_SMALL`.
pub fn find_straight_path(
    start: Vec3,
    end: Vec3,
    portals: &[Portal],
    max_points: usize,
) -> (PathQueryStatus, Vec<StraightPathPoint>) {
    let mut points = Vec::with_capacity(max_points.min(portals.len() + 2));
    let truncated = PathQueryStatus::SUCCESS | PathQueryStatus::BUFFER_TOO_SMALL;

    if max_points == 0 {
        return (truncated, points);
    }
    append(&mut points, start, StraightPathFlags::START, max_points);

    let mut funnel = Vec::with_capacity(portals.len() + 2);
    funnel.push(Portal { left: start, right: start, forced: false });
    funnel.extend_from_slice(portals);
    funnel.push(Portal { left: end, right: end, forced: false });

    let mut apex = start;
    let mut left = start;
    let mut right = start;
    let (mut apex_index, mut left_index, mut right_index) = (0usize, 0usize, 0usize);

    let mut i = 1;
    while i < funnel.len() {
        let portal = funnel[i];

        if portal.forced {
            let p = portal.left;
            let corner = if tri_area_xz(apex, left, p) < 0.0 && !same_xz(apex, left) {
                Some((left, left_index))
            } else if tri_area_xz(apex, right, p) > 0.0 && !same_xz(apex, right) {
                Some((right, right_index))
            } else {
                None
            };
            let (vertex, index, flags) = match corner {
                Some((vertex, index)) => (vertex, index, StraightPathFlags::NONE),
                None => (p, i, StraightPathFlags::OFFMESH_CONNECTION),
            };
            if !append(&mut points, vertex, flags, max_points) {
                return (truncated, points);
            }
            apex = vertex;
            left = vertex;
            right = vertex;
            apex_index = index;
            left_index = index;
            right_index = index;
            i = index + 1;
            continue;
        }

        // Right bound.
        if tri_area_xz(apex, right, portal.right) <= 0.0 {
            if same_xz(apex, right) || tri_area_xz(apex, left, portal.right) > 0.0 {
                right = portal.right;
                right_index = i;
            } else {
                // Crossed the left bound: it becomes a corner.
                if !append(&mut points, left, StraightPathFlags::NONE, max_points) {
                    return (truncated, points);
                }
                apex = left;
                apex_index = left_index;
                right = apex;
                right_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }

        // Left bound.
        if tri_area_xz(apex, left, portal.left) >= 0.0 {
            if same_xz(apex, left) || tri_area_xz(apex, right, portal.left) < 0.0 {
                left = portal.left;
                left_index = i;
            } else {
                if !append(&mut points, right, StraightPathFlags::NONE, max_points) {
                    return (truncated, points);
                }
                apex = right;
                apex_index = right_index;
                left = apex;
                left_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }

        i += 1;
    }

    if !append(&mut points, end, StraightPathFlags::END, max_points) {
        return (truncated, points);
    }
    (PathQueryStatus::SUCCESS, points)
}
