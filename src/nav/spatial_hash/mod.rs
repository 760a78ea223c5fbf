use bevy::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;


/// Cells searched around an agent: its own and the four axis neighbours.
const NEIGHBOUR_CELLS: [IVec2; 5] = [
    IVec2::ZERO,
    IVec2::new(1, 0),
    IVec2::new(-1, 0),
    IVec2::new(0, 1),
    IVec2::new(0, -1),
];

/// Snapshot of a flocking agent, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlockMember {
    pub entity: Entity,
    pub position: Vec3,
    /// Flattened facing direction.
    pub forward: Vec3,
}

/// Uniform hash over the world XZ plane for flocking neighbour queries.
///
/// Unlike a bounded grid, cells are keyed by integer coordinates so agents on
/// platforms far from the origin need no map size up front.
///
/// # Performance
///
/// - **Insert:** O(1) amortized
/// - **Query:** O(k) where k = agents in the five searched cells
/// - **Clear:** keeps the allocation of every cell used last tick
///
/// Rebuilt from scratch every tick, then read concurrently by every steering
/// task during that tick.
#[derive(Resource, Debug)]
pub struct FlockingHash {
    cell_size: f32,
    cells: FxHashMap<IVec2, SmallVec<[FlockMember; 8]>>,
}

impl Default for FlockingHash {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl FlockingHash {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            cells: FxHashMap::default(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Change the cell size. Drops all cells.
    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.cell_size = cell_size.max(f32::EPSILON);
        self.cells.clear();
    }

    pub fn cell_of(&self, position: Vec3) -> IVec2 {
        IVec2::new(
            (position.x / self.cell_size).floor() as i32,
            (position.z / self.cell_size).floor() as i32,
        )
    }

    pub fn clear(&mut self) {
        // Cells left empty by the previous tick are dropped; the rest keep their storage.
        self.cells.retain(|_, cell| !cell.is_empty());
        for cell in self.cells.values_mut() {
            cell.clear();
        }
    }

    pub fn insert(&mut self, member: FlockMember) {
        let cell = self.cell_of(member.position);
        self.cells.entry(cell).or_default().push(member);
    }

    /// Every other member in the cell of `position` and its four axis neighbours.
    pub fn neighbours(&self, entity: Entity, position: Vec3) -> impl Iterator<Item = &FlockMember> + '_ {
        let center = self.cell_of(position);
        NEIGHBOUR_CELLS
            .iter()
            .filter_map(move |offset| self.cells.get(&(center + *offset)))
            .flat_map(|cell| cell.iter())
            .filter(move |member| member.entity != entity)
    }

    pub fn total_entries(&self) -> usize {
        self.cells.values().map(|cell| cell.len()).sum()
    }

    pub fn non_empty_cells(&self) -> usize {
        self.cells.values().filter(|cell| !cell.is_empty()).count()
    }
}
