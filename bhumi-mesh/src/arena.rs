//! Id-keyed cell storage.
//!
//! Cells never hold references to each other; every neighbour edge stores a
//! [`CellId`] resolved through this arena. Edge creation and removal go
//! through the arena so both halves of an edge change together.

use std::collections::BTreeMap;

use crate::cell::{Cell, ConnectParams};
use crate::ids::CellId;

/// Ordered map of all cells owned by one navmesh.
#[derive(Clone, Debug, Default)]
pub struct CellArena {
    cells: BTreeMap<CellId, Cell>,
}

impl CellArena {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    #[inline]
    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains_key(&id)
    }

    /// Cells in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Store a cell. An existing cell with the same id is replaced.
    pub(crate) fn insert(&mut self, cell: Cell) {
        self.cells.insert(cell.id, cell);
    }

    /// Connect two stored cells. See [`Cell::add_neighbour_with`].
    pub fn connect(&mut self, a: CellId, b: CellId, params: ConnectParams) -> bool {
        if a == b {
            return false;
        }
        let Some(mut other) = self.cells.remove(&b) else {
            return false;
        };
        let connected = match self.cells.get_mut(&a) {
            Some(cell) => cell.add_neighbour_with(&mut other, params),
            None => false,
        };
        self.cells.insert(b, other);
        connected
    }

    /// Remove the edge between `a` and `b` on both sides.
    pub fn disconnect(&mut self, a: CellId, b: CellId) -> bool {
        let removed_a = self.cells.get_mut(&a).is_some_and(|c| c.remove_neighbour(b));
        let removed_b = self.cells.get_mut(&b).is_some_and(|c| c.remove_neighbour(a));
        removed_a || removed_b
    }

    /// Remove the cell from every neighbour's list and clear its own list.
    ///
    /// Returns the ids of the former neighbours.
    pub fn detach(&mut self, id: CellId) -> Vec<CellId> {
        let Some(cell) = self.cells.get_mut(&id) else {
            return Vec::new();
        };
        let peers: Vec<CellId> = cell.take_neighbours().into_iter().map(|n| n.cell_id).collect();
        for peer in &peers {
            if let Some(other) = self.cells.get_mut(peer) {
                other.remove_neighbour(id);
            }
        }
        peers
    }

    /// Detach and drop a cell.
    pub(crate) fn remove(&mut self, id: CellId) -> Option<Cell> {
        self.detach(id);
        self.cells.remove(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.cells.clear();
    }

    /// Check that every edge has its mirror and points at a live cell.
    pub fn is_symmetric(&self) -> bool {
        self.cells.values().all(|cell| {
            cell.neighbours().iter().all(|n| {
                n.cell_id != cell.id
                    && self
                        .cells
                        .get(&n.cell_id)
                        .is_some_and(|other| other.is_neighbour(cell.id))
            })
        })
    }
}
