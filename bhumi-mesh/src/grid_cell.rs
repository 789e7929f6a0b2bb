//! GridCell: spatial bucket of cells.

use serde::{Deserialize, Serialize};

use crate::arena::CellArena;
use crate::cell::{Cell, ConnectParams};
use crate::flags::MovementFlags;
use crate::geometry::Aabb;
use crate::ids::{CellId, GridCellId};

/// Spatial bucket owning base cells and region replacement cells.
///
/// The box is fixed at creation. Replacement cells are tracked separately and
/// are never scanned when connecting buckets.
#[derive(Clone, Debug)]
pub struct GridCell {
    id: GridCellId,
    aabb: Aabb,
    cells: Vec<CellId>,
    replacement_cells: Vec<CellId>,
    neighbours: Vec<GridCellId>,
}

impl GridCell {
    pub fn new(id: GridCellId, aabb: Aabb) -> Self {
        Self {
            id,
            aabb,
            cells: Vec::new(),
            replacement_cells: Vec::new(),
            neighbours: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> GridCellId {
        self.id
    }

    #[inline]
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Whether the point lies inside the bucket box within `tolerance`.
    pub fn contains(&self, p: crate::geometry::Vec3, tolerance: f32) -> bool {
        self.aabb.contains_tol(p, tolerance, f32::INFINITY)
    }

    /// Base cell ids in insertion order.
    #[inline]
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// Replacement cell ids in creation order.
    #[inline]
    pub fn replacement_cells(&self) -> &[CellId] {
        &self.replacement_cells
    }

    /// Base cells followed by replacements.
    pub fn all_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.iter().chain(self.replacement_cells.iter()).copied()
    }

    /// Adjacent bucket ids.
    #[inline]
    pub fn neighbours(&self) -> &[GridCellId] {
        &self.neighbours
    }

    /// Connect `cell` to every base cell of this bucket, then store it.
    pub fn add(&mut self, arena: &mut CellArena, mut cell: Cell, params: ConnectParams) -> CellId {
        cell.owner = self.id;
        let id = cell.id;
        arena.insert(cell);
        for &existing in &self.cells {
            arena.connect(id, existing, params);
        }
        self.cells.push(id);
        id
    }

    /// Connect every touching pair of base cells across two buckets.
    ///
    /// Safe to call repeatedly; existing edges are left alone. Returns the
    /// number of new edges.
    pub fn add_neighbour(&mut self, other: &mut GridCell, arena: &mut CellArena, params: ConnectParams) -> usize {
        if self.id == other.id {
            return 0;
        }

        let mut created = 0;
        for &a in &self.cells {
            for &b in &other.cells {
                let touching = match (arena.get(a), arena.get(b)) {
                    (Some(ca), Some(cb)) => ca.aabb.intersects_2d(&cb.aabb, params.tolerance),
                    _ => false,
                };
                if touching && arena.connect(a, b, params) {
                    created += 1;
                }
            }
        }

        if !self.neighbours.contains(&other.id) {
            self.neighbours.push(other.id);
        }
        if !other.neighbours.contains(&self.id) {
            other.neighbours.push(self.id);
        }
        created
    }

    pub(crate) fn push_replacement(&mut self, id: CellId) {
        self.replacement_cells.push(id);
    }

    pub(crate) fn remove_replacement(&mut self, id: CellId) {
        self.replacement_cells.retain(|&c| c != id);
    }

    /// Restore raw membership read from a snapshot.
    pub(crate) fn restore(
        id: GridCellId,
        aabb: Aabb,
        cells: Vec<CellId>,
        replacement_cells: Vec<CellId>,
        neighbours: Vec<GridCellId>,
    ) -> Self {
        Self {
            id,
            aabb,
            cells,
            replacement_cells,
            neighbours,
        }
    }
}

/// Input for [`Navmesh::add`](crate::Navmesh::add): a bucket and its base cells.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GridCellData {
    /// Requested id; generated when `None`
    pub id: Option<GridCellId>,
    /// Bucket bounds
    pub aabb: Aabb,
    /// Base cells
    pub cells: Vec<CellData>,
}

/// One base cell of a [`GridCellData`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    pub aabb: Aabb,
    pub flags: MovementFlags,
    pub movement_cost_mult: f32,
}

impl CellData {
    /// Walkable cell with unit cost.
    pub fn walk(aabb: Aabb) -> Self {
        Self {
            aabb,
            flags: MovementFlags::WALK,
            movement_cost_mult: 1.0,
        }
    }
}

impl GridCellData {
    pub fn new(aabb: Aabb) -> Self {
        Self {
            id: None,
            aabb,
            cells: Vec::new(),
        }
    }

    /// Builder-style cell append.
    pub fn with_cell(mut self, cell: CellData) -> Self {
        self.cells.push(cell);
        self
    }

    /// Bucket made of one walkable cell covering the whole box.
    pub fn single(aabb: Aabb) -> Self {
        Self::new(aabb).with_cell(CellData::walk(aabb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_cell(id: CellId, aabb: Aabb) -> Cell {
        Cell::new(id, aabb, MovementFlags::WALK, 0)
    }

    #[test]
    fn test_add_connects_within_bucket() {
        let mut arena = CellArena::new();
        let mut grid = GridCell::new(4, Aabb::from_coords(0.0, 0.0, 0.0, 20.0, 10.0, 0.0));
        let params = ConnectParams::default();

        grid.add(&mut arena, walk_cell(0, Aabb::from_coords(0.0, 0.0, 0.0, 10.0, 10.0, 0.0)), params);
        grid.add(&mut arena, walk_cell(1, Aabb::from_coords(10.0, 0.0, 0.0, 20.0, 10.0, 0.0)), params);

        assert_eq!(grid.cells(), &[0, 1]);
        assert_eq!(arena.get(1).unwrap().owner, 4);
        assert!(arena.get(0).unwrap().is_neighbour(1));
    }

    #[test]
    fn test_add_neighbour_is_repeatable() {
        let mut arena = CellArena::new();
        let params = ConnectParams::default();
        let mut left = GridCell::new(0, Aabb::from_coords(0.0, 0.0, 0.0, 10.0, 10.0, 0.0));
        let mut right = GridCell::new(1, Aabb::from_coords(10.0, 0.0, 0.0, 20.0, 10.0, 0.0));
        left.add(&mut arena, walk_cell(0, *left.aabb()), params);
        right.add(&mut arena, walk_cell(1, *right.aabb()), params);

        assert_eq!(left.add_neighbour(&mut right, &mut arena, params), 1);
        assert_eq!(left.add_neighbour(&mut right, &mut arena, params), 0);
        assert_eq!(right.add_neighbour(&mut left, &mut arena, params), 0);

        assert_eq!(left.neighbours(), &[1]);
        assert_eq!(right.neighbours(), &[0]);
        assert_eq!(arena.get(0).unwrap().neighbours().len(), 1);
    }
}
