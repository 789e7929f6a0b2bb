//! Stable ids and the per-navmesh id generator.

use serde::{Deserialize, Serialize};

/// Id of a [`Cell`](crate::Cell). Never reused within one navmesh.
pub type CellId = u32;

/// Id of a [`GridCell`](crate::GridCell).
pub type GridCellId = u32;

/// Id of a [`CellsPatch`](crate::CellsPatch).
pub type PatchId = u32;

/// Monotonic id source owned by one navmesh instance.
///
/// Separate counters per entity kind keep ids dense and make two navmeshes
/// built from the same input produce identical ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenerator {
    next_cell: CellId,
    next_grid_cell: GridCellId,
    next_patch: PatchId,
}

impl IdGenerator {
    /// Fresh generator starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next cell id
    pub fn next_cell(&mut self) -> CellId {
        let id = self.next_cell;
        self.next_cell += 1;
        id
    }

    /// Next grid cell id
    pub fn next_grid_cell(&mut self) -> GridCellId {
        let id = self.next_grid_cell;
        self.next_grid_cell += 1;
        id
    }

    /// Next patch id
    pub fn next_patch(&mut self) -> PatchId {
        let id = self.next_patch;
        self.next_patch += 1;
        id
    }

    /// Ensure a grid cell id supplied from outside is never handed out again.
    pub fn reserve_grid_cell(&mut self, id: GridCellId) {
        self.next_grid_cell = self.next_grid_cell.max(id.saturating_add(1));
    }

    /// Raw counter values (cell, grid cell, patch) for snapshots.
    pub fn counters(&self) -> (u32, u32, u32) {
        (self.next_cell, self.next_grid_cell, self.next_patch)
    }

    /// Restore counters read from a snapshot.
    pub fn from_counters(next_cell: u32, next_grid_cell: u32, next_patch: u32) -> Self {
        Self {
            next_cell,
            next_grid_cell,
            next_patch,
        }
    }
}
