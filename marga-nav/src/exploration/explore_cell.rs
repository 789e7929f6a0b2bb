//! Frontier cells and the graph they form.

use std::collections::{BTreeMap, BTreeSet};

use bhumi_mesh::algorithms::{CellGraph, GraphNode};
use bhumi_mesh::{Aabb, CellId, MovementFlags, Neighbour, PatchId, Vec3};

pub type ExploreCellId = u32;

/// One square of the frontier lattice.
#[derive(Clone, Debug, PartialEq)]
pub struct ExploreCell {
    pub id: ExploreCellId,
    /// Square clipped to the extent of the discovered cells inside it
    pub aabb: Aabb,
    /// Lattice coordinates
    pub square: (i32, i32),
    /// Navmesh cells overlapping the square
    pub cells: Vec<CellId>,
    /// Discovered area inside the square
    pub area: f32,
    pub explored: bool,
    /// Found unreachable once
    pub delayed: bool,
    pub small: bool,
    /// Navmesh patches overlapping the cell
    pub patches: Vec<PatchId>,
    pub(crate) neighbours: Vec<Neighbour>,
    /// `cells` plus their navmesh neighbours
    pub(crate) reach: BTreeSet<CellId>,
}

impl ExploreCell {
    pub fn neighbours(&self) -> &[Neighbour] {
        &self.neighbours
    }

    pub fn is_neighbour(&self, id: ExploreCellId) -> bool {
        self.neighbours.iter().any(|n| n.cell_id == id)
    }

    /// Whether the underlying navmesh cells are shared or adjacent.
    pub(crate) fn touches(&self, other: &ExploreCell) -> bool {
        other.cells.iter().any(|c| self.reach.contains(c)) || self.cells.iter().any(|c| other.reach.contains(c))
    }
}

impl GraphNode for ExploreCell {
    fn id(&self) -> u32 {
        self.id
    }

    fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    fn flags(&self) -> MovementFlags {
        MovementFlags::WALK
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn edges(&self) -> &[Neighbour] {
        &self.neighbours
    }
}

/// Frontier cells keyed by id, at most one per lattice square.
#[derive(Clone, Debug, Default)]
pub struct ExploreMap {
    cells: BTreeMap<ExploreCellId, ExploreCell>,
    squares: BTreeMap<(i32, i32), ExploreCellId>,
}

impl CellGraph for ExploreMap {
    type Node = ExploreCell;

    fn node(&self, id: u32) -> Option<&ExploreCell> {
        self.cells.get(&id)
    }
}

impl ExploreMap {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, id: ExploreCellId) -> Option<&ExploreCell> {
        self.cells.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ExploreCellId) -> Option<&mut ExploreCell> {
        self.cells.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExploreCell> {
        self.cells.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ExploreCell> {
        self.cells.values_mut()
    }

    pub fn at_square(&self, square: (i32, i32)) -> Option<ExploreCellId> {
        self.squares.get(&square).copied()
    }

    /// Insert a detached cell. Returns the cell it displaced in the same square.
    pub(crate) fn insert(&mut self, cell: ExploreCell) -> Option<ExploreCell> {
        let displaced = self.at_square(cell.square).and_then(|old| self.remove(old));
        self.squares.insert(cell.square, cell.id);
        self.cells.insert(cell.id, cell);
        displaced
    }

    /// Detach and remove a cell.
    pub(crate) fn remove(&mut self, id: ExploreCellId) -> Option<ExploreCell> {
        let mut cell = self.cells.remove(&id)?;
        for n in cell.neighbours.drain(..) {
            if let Some(peer) = self.cells.get_mut(&n.cell_id) {
                peer.neighbours.retain(|e| e.cell_id != id);
            }
        }
        if self.squares.get(&cell.square) == Some(&id) {
            self.squares.remove(&cell.square);
        }
        Some(cell)
    }

    pub(crate) fn clear(&mut self) -> Vec<ExploreCellId> {
        let ids = self.cells.keys().copied().collect();
        self.cells.clear();
        self.squares.clear();
        ids
    }

    /// Cells in the 3x3 block of squares around `square`.
    pub(crate) fn around(&self, square: (i32, i32)) -> Vec<ExploreCellId> {
        let (sx, sy) = square;
        let mut found = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(id) = self.at_square((sx + dx, sy + dy)) {
                    found.push(id);
                }
            }
        }
        found
    }

    /// Connect two cells. Returns the edge length, or `None` when either is
    /// missing or they are already connected.
    pub(crate) fn connect(&mut self, a: ExploreCellId, b: ExploreCellId) -> Option<f32> {
        if a == b {
            return None;
        }
        let (ca, cb) = (self.cells.get(&a)?, self.cells.get(&b)?);
        if ca.is_neighbour(b) {
            return None;
        }

        let border_point = match ca.aabb.intersection_2d_tolerant(&cb.aabb, 0.01) {
            Some(border) => border.center(),
            None => ca.aabb.center().lerp(cb.aabb.center(), 0.5),
        };
        let distance = ca.aabb.center().distance(cb.aabb.center());
        let edge = |cell_id| Neighbour {
            cell_id,
            border_point,
            connection_flags: MovementFlags::WALK,
            distance,
        };

        self.cells.get_mut(&a)?.neighbours.push(edge(b));
        self.cells.get_mut(&b)?.neighbours.push(edge(a));
        Some(distance)
    }

    /// Cell containing the point (top-down), else the nearest one within
    /// `tolerance`. Ties go to the lower id.
    pub fn cell_at(&self, p: Vec3, tolerance: f32) -> Option<ExploreCellId> {
        let mut best: Option<(f32, ExploreCellId)> = None;
        for cell in self.cells.values() {
            let d = cell.aabb.distance_2d(p);
            if d > tolerance {
                continue;
            }
            if best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, cell.id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Every edge is stored on both endpoints.
    pub fn is_symmetric(&self) -> bool {
        self.cells.values().all(|cell| {
            cell.neighbours
                .iter()
                .all(|n| self.cells.get(&n.cell_id).is_some_and(|peer| peer.is_neighbour(cell.id)))
        })
    }
}
