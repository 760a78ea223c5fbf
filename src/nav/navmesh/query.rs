use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use super::{NavMesh, NavMeshLocation, PolyRef};

/// Scale on the straight-line heuristic so it never overestimates.
const HEURISTIC_SCALE: f32 = 0.999;

/// Outcome of a path query, as a set of status bits.
///
/// Exactly one of `FAILURE`, `SUCCESS` or `IN_PROGRESS` is set; detail bits
/// explain partial or failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathQueryStatus(pub u32);

impl PathQueryStatus {
    pub const FAILURE: Self = Self(1 << 31);
    pub const SUCCESS: Self = Self(1 << 30);
    pub const IN_PROGRESS: Self = Self(1 << 29);

    pub const INVALID_PARAM: Self = Self(1 << 3);
    pub const BUFFER_TOO_SMALL: Self = Self(1 << 4);
    pub const OUT_OF_NODES: Self = Self(1 << 5);
    pub const PARTIAL_RESULT: Self = Self(1 << 6);

    const STATE_MASK: u32 = Self::FAILURE.0 | Self::SUCCESS.0 | Self::IN_PROGRESS.0;

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_success(self) -> bool {
        self.contains(Self::SUCCESS)
    }

    pub fn is_failure(self) -> bool {
        self.contains(Self::FAILURE)
    }

    pub fn is_in_progress(self) -> bool {
        self.contains(Self::IN_PROGRESS)
    }

    /// Detail bits only.
    pub fn detail(self) -> Self {
        Self(self.0 & !Self::STATE_MASK)
    }

    /// Replace the state bits, keeping detail.
    fn with_state(self, state: Self) -> Self {
        Self(self.detail().0 | state.0)
    }
}

impl BitOr for PathQueryStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PathQueryStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    poly: PolyRef,
    parent: Option<usize>,
    /// Position the node was entered at (portal midpoint, or the start point).
    pos: Vec3,
    cost: f32,
    total: f32,
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    total: f32,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    // Reversed so the BinaryHeap pops the cheapest node first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .total
            .total_cmp(&self.total)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Reusable A* context over the polygons of one tile.
///
/// The search is sliced: [`begin_find_path`](Self::begin_find_path) sets it
/// up, [`update_find_path`](Self::update_find_path) advances it by a bounded
/// number of iterations, and [`end_find_path`](Self::end_find_path) extracts
/// the polygon corridor. All buffers are kept between searches and reset on
/// every `begin_find_path`.
#[derive(Debug)]
pub struct NavMeshQuery {
    max_nodes: usize,
    nodes: Vec<Node>,
    node_lookup: FxHashMap<PolyRef, usize>,
    closed: FixedBitSet,
    open: BinaryHeap<OpenEntry>,

    mesh: Option<Arc<NavMesh>>,
    start: Option<NavMeshLocation>,
    end: Option<NavMeshLocation>,
    mask: u32,
    status: PathQueryStatus,
    best_node: usize,
    best_heuristic: f32,
}

impl Default for NavMeshQuery {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl NavMeshQuery {
    pub fn new(max_nodes: usize) -> Self {
        Self {
            max_nodes: max_nodes.max(1),
            nodes: Vec::new(),
            node_lookup: FxHashMap::default(),
            closed: FixedBitSet::new(),
            open: BinaryHeap::new(),
            mesh: None,
            start: None,
            end: None,
            mask: u32::MAX,
            status: PathQueryStatus::FAILURE,
            best_node: 0,
            best_heuristic: f32::INFINITY,
        }
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn set_max_nodes(&mut self, max_nodes: usize) {
        self.max_nodes = max_nodes.max(1);
    }

    pub fn status(&self) -> PathQueryStatus {
        self.status
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.node_lookup.clear();
        self.closed.clear();
        self.open.clear();
        self.mesh = None;
        self.start = None;
        self.end = None;
        self.best_node = 0;
        self.best_heuristic = f32::INFINITY;
    }

    /// Start a search from `start` to `end` over polygons allowed by `mask`.
    pub fn begin_find_path(
        &mut self,
        mesh: &Arc<NavMesh>,
        start: NavMeshLocation,
        end: NavMeshLocation,
        mask: u32,
    ) -> PathQueryStatus {
        self.reset();

        let poly_count = mesh.poly_count();
        if start.poly as usize >= poly_count || end.poly as usize >= poly_count {
            self.status = PathQueryStatus::FAILURE | PathQueryStatus::INVALID_PARAM;
            return self.status;
        }

        self.closed.grow(poly_count);
        self.mesh = Some(Arc::clone(mesh));
        self.start = Some(start);
        self.end = Some(end);
        self.mask = mask;

        let heuristic = start.point.distance(end.point) * HEURISTIC_SCALE;
        self.nodes.push(Node {
            poly: start.poly,
            parent: None,
            pos: start.point,
            cost: 0.0,
            total: heuristic,
        });
        self.node_lookup.insert(start.poly, 0);
        self.best_heuristic = heuristic;

        if start.poly == end.poly {
            self.status = PathQueryStatus::SUCCESS;
            return self.status;
        }

        self.open.push(OpenEntry { total: heuristic, node: 0 });
        self.status = PathQueryStatus::IN_PROGRESS;
        self.status
    }

    /// Advance the search by at most `max_iterations` node expansions.
    ///
    /// Returns the status and the number of iterations spent.
    pub fn update_find_path(&mut self, max_iterations: u32) -> (PathQueryStatus, u32) {
        if !self.status.is_in_progress() {
            return (self.status, 0);
        }
        let (Some(mesh), Some(end)) = (self.mesh.clone(), self.end) else {
            self.status = PathQueryStatus::FAILURE;
            return (self.status, 0);
        };

        let mut iterations = 0;
        while iterations < max_iterations {
            let Some(entry) = self.open.pop() else {
                // Exhausted without reaching the goal: settle for the closest node.
                self.status = self
                    .status
                    .with_state(PathQueryStatus::SUCCESS)
                    | PathQueryStatus::PARTIAL_RESULT;
                return (self.status, iterations);
            };
            iterations += 1;

            let current = self.nodes[entry.node];
            if entry.total > current.total || self.closed.contains(current.poly as usize) {
                continue;
            }
            self.closed.insert(current.poly as usize);

            if current.poly == end.poly {
                self.best_node = entry.node;
                self.status = self.status.with_state(PathQueryStatus::SUCCESS);
                return (self.status, iterations);
            }

            let Some(poly) = mesh.poly(current.poly) else {
                continue;
            };
            for link in &poly.links {
                let neighbour = link.to;
                if self.closed.contains(neighbour as usize) {
                    continue;
                }
                let Some(neighbour_poly) = mesh.poly(neighbour) else {
                    continue;
                };
                if neighbour_poly.mask & self.mask == 0 {
                    continue;
                }

                let pos = (link.left + link.right) * 0.5;
                let mut cost = current.cost + current.pos.distance(pos);
                let heuristic = if neighbour == end.poly {
                    cost += pos.distance(end.point);
                    0.0
                } else {
                    pos.distance(end.point) * HEURISTIC_SCALE
                };
                let total = cost + heuristic;

                let index = match self.node_lookup.get(&neighbour) {
                    Some(&index) => {
                        if total >= self.nodes[index].total {
                            continue;
                        }
                        index
                    }
                    None => {
                        if self.nodes.len() >= self.max_nodes {
                            self.status |= PathQueryStatus::OUT_OF_NODES;
                            continue;
                        }
                        self.nodes.push(Node {
                            poly: neighbour,
                            parent: None,
                            pos,
                            cost,
                            total,
                        });
                        self.node_lookup.insert(neighbour, self.nodes.len() - 1);
                        self.nodes.len() - 1
                    }
                };

                let node = &mut self.nodes[index];
                node.parent = Some(entry.node);
                node.pos = pos;
                node.cost = cost;
                node.total = total;
                self.open.push(OpenEntry { total, node: index });

                if heuristic < self.best_heuristic {
                    self.best_heuristic = heuristic;
                    self.best_node = index;
                }
            }
        }

        (self.status, iterations)
    }

    /// Extract the corridor found so far, at most `max_len` polygons long.
    ///
    /// Only meaningful once the search reports success. A corridor that does
    /// not reach the goal polygon is flagged `PARTIAL_RESULT`.
    pub fn end_find_path(&mut self, max_len: usize) -> (PathQueryStatus, Vec<PolyRef>) {
        if !self.status.is_success() {
            return (self.status, Vec::new());
        }

        let mut corridor = Vec::new();
        let mut cursor = Some(self.best_node);
        while let Some(index) = cursor {
            let node = &self.nodes[index];
            corridor.push(node.poly);
            cursor = node.parent;
        }
        corridor.reverse();

        let mut status = self.status;
        if self.end.is_some_and(|end| corridor.last() != Some(&end.poly)) {
            status |= PathQueryStatus::PARTIAL_RESULT;
        }
        if corridor.len() > max_len {
            corridor.truncate(max_len);
            status |= PathQueryStatus::BUFFER_TOO_SMALL;
        }
        (status, corridor)
    }

    /// Run a whole search in one call.
    pub fn find_path(
        &mut self,
        mesh: &Arc<NavMesh>,
        start: NavMeshLocation,
        end: NavMeshLocation,
        mask: u32,
        max_iterations: u32,
        max_len: usize,
    ) -> (PathQueryStatus, Vec<PolyRef>) {
        let status = self.begin_find_path(mesh, start, end, mask);
        if status.is_failure() {
            return (status, Vec::new());
        }
        let (status, _) = self.update_find_path(max_iterations);
        if !status.is_success() {
            return (status, Vec::new());
        }
        self.end_find_path(max_len)
    }
}
