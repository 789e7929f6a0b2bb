//! Connectivity patches.
//!
//! A patch is one connected component of enabled cells under a movement flag.
//! Patches are rebuilt wholesale: toggling a single cell can join or split
//! components anywhere in the graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::arena::CellArena;
use crate::flags::MovementFlags;
use crate::geometry::{Aabb, Vec3};
use crate::grid_cell::GridCell;
use crate::ids::{CellId, GridCellId, IdGenerator, PatchId};

/// Snapshot of one member cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchCell {
    pub id: CellId,
    pub aabb: Aabb,
    pub flags: MovementFlags,
}

/// Members of a patch that belong to one grid cell.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchBucket {
    /// Grid cell box
    pub aabb: Aabb,
    pub cells: Vec<PatchCell>,
}

/// One connected component of enabled cells.
#[derive(Clone, Debug, PartialEq)]
pub struct CellsPatch {
    id: PatchId,
    flags: MovementFlags,
    cells: BTreeSet<CellId>,
    buckets: BTreeMap<GridCellId, PatchBucket>,
}

impl CellsPatch {
    #[inline]
    pub fn id(&self) -> PatchId {
        self.id
    }

    #[inline]
    pub fn flags(&self) -> MovementFlags {
        self.flags
    }

    #[inline]
    pub fn contains_cell(&self, id: CellId) -> bool {
        self.cells.contains(&id)
    }

    #[inline]
    pub fn cells_count(&self) -> usize {
        self.cells.len()
    }

    /// Member ids in ascending order.
    pub fn cell_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.iter().copied()
    }

    /// Grid buckets the patch touches.
    pub fn buckets(&self) -> impl Iterator<Item = (&GridCellId, &PatchBucket)> {
        self.buckets.iter()
    }

    /// Members within `tolerance` of the point.
    pub fn get_cells_within(&self, point: Vec3, tolerance: f32, flags: MovementFlags) -> Vec<CellId> {
        let mut found = Vec::new();
        for bucket in self.buckets.values() {
            if bucket.aabb.distance_2d(point) > tolerance {
                continue;
            }
            for cell in &bucket.cells {
                if cell.flags.contains(flags) && cell.aabb.distance(point) <= tolerance {
                    found.push(cell.id);
                }
            }
        }
        found.sort_unstable();
        found
    }

    /// Members overlapping the box (touching counts).
    pub fn get_cells_within_box(&self, aabb: &Aabb, flags: MovementFlags) -> Vec<CellId> {
        let mut found = Vec::new();
        for bucket in self.buckets.values() {
            if !bucket.aabb.intersects_2d(aabb, 0.0) {
                continue;
            }
            for cell in &bucket.cells {
                if cell.flags.contains(flags) && cell.aabb.intersects(aabb) {
                    found.push(cell.id);
                }
            }
        }
        found.sort_unstable();
        found
    }

    /// Nearest member within `tolerance` and the point snapped onto it.
    ///
    /// Ties go to the lower cell id.
    pub fn nearest(&self, point: Vec3, tolerance: f32, flags: MovementFlags) -> Option<(CellId, Vec3)> {
        let mut best: Option<(f32, CellId, Vec3)> = None;
        for bucket in self.buckets.values() {
            if bucket.aabb.distance_2d(point) > tolerance {
                continue;
            }
            for cell in &bucket.cells {
                if !cell.flags.contains(flags) {
                    continue;
                }
                let snapped = cell.aabb.closest_point(point);
                let d = snapped.distance(point);
                if d > tolerance {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((bd, bid, _)) => d < bd || (d == bd && cell.id < bid),
                };
                if better {
                    best = Some((d, cell.id, snapped));
                }
            }
        }
        best.map(|(_, id, p)| (id, p))
    }

    pub(crate) fn restore(
        id: PatchId,
        flags: MovementFlags,
        members: impl IntoIterator<Item = CellId>,
        arena: &CellArena,
        grids: &BTreeMap<GridCellId, GridCell>,
    ) -> Self {
        let mut patch = Self {
            id,
            flags,
            cells: BTreeSet::new(),
            buckets: BTreeMap::new(),
        };
        for cell_id in members {
            patch.push(cell_id, arena, grids);
        }
        patch
    }

    fn push(&mut self, cell_id: CellId, arena: &CellArena, grids: &BTreeMap<GridCellId, GridCell>) {
        let Some(cell) = arena.get(cell_id) else {
            return;
        };
        self.cells.insert(cell_id);
        let bucket = self.buckets.entry(cell.owner).or_insert_with(|| PatchBucket {
            aabb: grids.get(&cell.owner).map(|g| *g.aabb()).unwrap_or(cell.aabb),
            cells: Vec::new(),
        });
        bucket.cells.push(PatchCell {
            id: cell_id,
            aabb: cell.aabb,
            flags: cell.flags,
        });
    }
}

/// Flood fill every enabled cell carrying `flags` into patches.
///
/// Edges are followed only when they carry `flags` too. Seeds are taken in
/// ascending cell id order, so patch contents are deterministic.
pub fn build_patches(
    arena: &CellArena,
    grids: &BTreeMap<GridCellId, GridCell>,
    flags: MovementFlags,
    ids: &mut IdGenerator,
) -> Vec<CellsPatch> {
    let mut visited: BTreeSet<CellId> = BTreeSet::new();
    let mut patches = Vec::new();
    let mut queue = VecDeque::new();

    for seed in arena.iter() {
        if visited.contains(&seed.id) || !seed.is_enabled() || !seed.has_flags(flags) {
            continue;
        }

        let mut patch = CellsPatch {
            id: ids.next_patch(),
            flags,
            cells: BTreeSet::new(),
            buckets: BTreeMap::new(),
        };

        visited.insert(seed.id);
        queue.push_back(seed.id);

        while let Some(current) = queue.pop_front() {
            patch.push(current, arena, grids);
            let Some(cell) = arena.get(current) else {
                continue;
            };
            for edge in cell.neighbours() {
                if visited.contains(&edge.cell_id) || !edge.connection_flags.contains(flags) {
                    continue;
                }
                let passable = arena
                    .get(edge.cell_id)
                    .is_some_and(|n| n.is_enabled() && n.has_flags(flags));
                if passable {
                    visited.insert(edge.cell_id);
                    queue.push_back(edge.cell_id);
                }
            }
        }

        tracing::trace!("Patch {} built with {} cells", patch.id, patch.cells.len());
        patches.push(patch);
    }

    patches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, ConnectParams};

    fn setup() -> (CellArena, BTreeMap<GridCellId, GridCell>) {
        // Two connected cells and one isolated cell in one grid bucket
        let mut arena = CellArena::new();
        let mut grid = GridCell::new(0, Aabb::from_coords(0.0, 0.0, 0.0, 50.0, 10.0, 0.0));
        let params = ConnectParams::default();
        for (id, x0, x1) in [(0, 0.0, 10.0), (1, 10.0, 20.0), (2, 30.0, 40.0)] {
            grid.add(
                &mut arena,
                Cell::new(id, Aabb::from_coords(x0, 0.0, 0.0, x1, 10.0, 0.0), MovementFlags::WALK, 0),
                params,
            );
        }
        let mut grids = BTreeMap::new();
        grids.insert(0, grid);
        (arena, grids)
    }

    #[test]
    fn test_patches_partition_enabled_cells() {
        let (arena, grids) = setup();
        let mut ids = IdGenerator::new();
        let patches = build_patches(&arena, &grids, MovementFlags::WALK, &mut ids);

        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].cell_ids().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(patches[1].cell_ids().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_disabled_cell_splits_patch() {
        let (mut arena, grids) = setup();
        arena.get_mut(0).unwrap().disabled = true;
        let mut ids = IdGenerator::new();
        let patches = build_patches(&arena, &grids, MovementFlags::WALK, &mut ids);

        assert_eq!(patches.len(), 2);
        assert!(patches.iter().all(|p| !p.contains_cell(0)));
    }

    #[test]
    fn test_nearest_snaps_point() {
        let (arena, grids) = setup();
        let mut ids = IdGenerator::new();
        let patches = build_patches(&arena, &grids, MovementFlags::WALK, &mut ids);

        let (id, snapped) = patches[0].nearest(Vec3::new(5.0, 11.0, 0.0), 2.0, MovementFlags::WALK).unwrap();
        assert_eq!(id, 0);
        assert_eq!(snapped, Vec3::new(5.0, 10.0, 0.0));
        assert!(patches[0].nearest(Vec3::new(5.0, 15.0, 0.0), 2.0, MovementFlags::WALK).is_none());

        assert_eq!(patches[0].get_cells_within(Vec3::new(10.0, 5.0, 0.0), 0.5, MovementFlags::WALK), vec![0, 1]);
        assert_eq!(
            patches[1].get_cells_within_box(&Aabb::from_coords(25.0, 0.0, 0.0, 35.0, 5.0, 0.0), MovementFlags::WALK),
            vec![2]
        );
    }
}
