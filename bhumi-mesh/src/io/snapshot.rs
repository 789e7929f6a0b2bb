//! Binary navmesh snapshots.
//!
//! Format (little-endian):
//! - Header: magic "BHNM", version u8
//! - Id generator counters: 3 × u32
//! - Grid cells: id, box, base cell ids, replacement ids, neighbour grid ids
//! - Cells: id, box, flags, cost, threat, owner, disabled, replacement, edges
//! - Regions, overlay bookkeeping, blocker set
//! - Patches: version, then id, flags, member ids
//!
//! Reading builds the whole state aside and validates every reference before
//! swapping it in, so a rejected snapshot leaves the navmesh untouched.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::binary::{BinReader, BinWriter};
use crate::arena::CellArena;
use crate::cell::{Cell, Neighbour};
use crate::error::{NavmeshError, Result};
use crate::grid_cell::GridCell;
use crate::ids::IdGenerator;
use crate::navmesh::{Navmesh, NavmeshData, OverlayEntry, PatchState, RegionState};
use crate::patch::CellsPatch;
use crate::region::Region;

const MAGIC: &[u8; 4] = b"BHNM";
const VERSION: u8 = 1;

fn write_regions<W: Write>(w: &mut BinWriter<'_, W>, regions: &[Region]) -> Result<()> {
    w.len(regions.len())?;
    for r in regions {
        w.aabb(&r.aabb)?;
        w.f32(r.movement_cost_mult)?;
        w.f32(r.threat)?;
    }
    Ok(())
}

fn read_regions<R: Read>(r: &mut BinReader<'_, R>) -> Result<Vec<Region>> {
    let n = r.len()?;
    let mut regions = Vec::with_capacity(n.min(4096));
    for _ in 0..n {
        let aabb = r.aabb()?;
        let cost = r.f32()?;
        let threat = r.f32()?;
        regions.push(Region::new(aabb, cost, threat));
    }
    Ok(regions)
}

fn invalid(msg: String) -> NavmeshError {
    NavmeshError::InvalidSnapshot(msg)
}

impl Navmesh {
    /// Write the full graph, overlay and patch state.
    pub fn write_snapshot<W: Write>(&self, writer: &mut W) -> Result<()> {
        let data = self.data.read();
        let regions = self.regions.read();
        let patches = self.patches.read();
        let mut w = BinWriter::new(writer);

        w.header(MAGIC, VERSION)?;

        let (next_cell, next_grid, next_patch) = data.ids.counters();
        w.u32(next_cell)?;
        w.u32(next_grid)?;
        w.u32(next_patch)?;
        w.bool(data.patches_dirty)?;

        w.len(data.grid_cells.len())?;
        for grid in data.grid_cells.values() {
            w.u32(grid.id())?;
            w.aabb(grid.aabb())?;
            w.ids(grid.cells())?;
            w.ids(grid.replacement_cells())?;
            w.ids(grid.neighbours())?;
        }

        w.len(data.arena.len())?;
        for cell in data.arena.iter() {
            w.u32(cell.id)?;
            w.aabb(&cell.aabb)?;
            w.flags(cell.flags)?;
            w.f32(cell.movement_cost_mult)?;
            w.f32(cell.threat)?;
            w.u32(cell.owner)?;
            w.bool(!cell.is_enabled())?;
            w.bool(cell.is_replacement())?;
            w.len(cell.neighbours().len())?;
            for n in cell.neighbours() {
                w.u32(n.cell_id)?;
                w.vec3(n.border_point)?;
                w.flags(n.connection_flags)?;
                w.f32(n.distance)?;
            }
        }

        write_regions(&mut w, &regions.requested)?;
        w.bool(regions.dirty)?;
        w.len(regions.overlay.len())?;
        for (cell_id, entry) in &regions.overlay {
            w.u32(*cell_id)?;
            write_regions(&mut w, &entry.regions)?;
            w.ids(&entry.replacements)?;
        }
        write_regions(&mut w, &regions.blockers)?;

        w.u64(patches.version)?;
        w.len(patches.patches.len())?;
        for patch in &patches.patches {
            w.u32(patch.id())?;
            w.flags(patch.flags())?;
            // Bucket order, so restored buckets list cells in the same order
            let members: Vec<u32> = patch
                .buckets()
                .flat_map(|(_, bucket)| bucket.cells.iter().map(|c| c.id))
                .collect();
            w.ids(&members)?;
        }
        Ok(())
    }

    /// Replace the navmesh state with a snapshot.
    ///
    /// On error the current state is left unchanged.
    pub fn read_snapshot<R: Read>(&self, reader: &mut R) -> Result<()> {
        let mut r = BinReader::new(reader);
        r.header(MAGIC, VERSION)?;

        let next_cell = r.u32()?;
        let next_grid = r.u32()?;
        let next_patch = r.u32()?;
        let patches_dirty = r.bool()?;

        let mut grid_cells = BTreeMap::new();
        for _ in 0..r.len()? {
            let id = r.u32()?;
            let aabb = r.aabb()?;
            let cells = r.ids()?;
            let replacements = r.ids()?;
            let neighbours = r.ids()?;
            if id >= next_grid {
                return Err(invalid(format!("grid cell id {} beyond generator", id)));
            }
            grid_cells.insert(id, GridCell::restore(id, aabb, cells, replacements, neighbours));
        }

        let mut arena = CellArena::new();
        for _ in 0..r.len()? {
            let id = r.u32()?;
            let aabb = r.aabb()?;
            let flags = r.flags()?;
            let cost = r.f32()?;
            let threat = r.f32()?;
            let owner = r.u32()?;
            let disabled = r.bool()?;
            let replacement = r.bool()?;

            let mut cell = if replacement {
                Cell::new_replacement(id, aabb, flags, owner, cost, threat)
            } else {
                let mut c = Cell::new(id, aabb, flags, owner);
                c.movement_cost_mult = cost;
                c.threat = threat;
                c
            };
            cell.disabled = disabled;
            for _ in 0..r.len()? {
                let cell_id = r.u32()?;
                let border_point = r.vec3()?;
                let connection_flags = r.flags()?;
                let distance = r.f32()?;
                cell.push_neighbour(Neighbour {
                    cell_id,
                    border_point,
                    connection_flags,
                    distance,
                });
            }
            if id >= next_cell {
                return Err(invalid(format!("cell id {} beyond generator", id)));
            }
            if !grid_cells.contains_key(&owner) {
                return Err(invalid(format!("cell {} owned by unknown grid cell {}", id, owner)));
            }
            arena.insert(cell);
        }

        let requested = read_regions(&mut r)?;
        let regions_dirty = r.bool()?;
        let mut overlay = BTreeMap::new();
        for _ in 0..r.len()? {
            let cell_id = r.u32()?;
            let regions = read_regions(&mut r)?;
            let replacements = r.ids()?;
            overlay.insert(cell_id, OverlayEntry { regions, replacements });
        }
        let blockers = read_regions(&mut r)?;

        let version = r.u64()?;
        let mut patch_members = Vec::new();
        for _ in 0..r.len()? {
            let id = r.u32()?;
            let flags = r.flags()?;
            let members = r.ids()?;
            if id >= next_patch {
                return Err(invalid(format!("patch id {} beyond generator", id)));
            }
            patch_members.push((id, flags, members));
        }

        // Referential integrity
        if !arena.is_symmetric() {
            return Err(invalid("neighbour edges are not symmetric or reference missing cells".into()));
        }
        for grid in grid_cells.values() {
            if let Some(missing) = grid.all_cells().find(|id| !arena.contains(*id)) {
                return Err(invalid(format!("grid cell {} references missing cell {}", grid.id(), missing)));
            }
            if let Some(missing) = grid.neighbours().iter().find(|id| !grid_cells.contains_key(*id)) {
                return Err(invalid(format!("grid cell {} references missing grid cell {}", grid.id(), missing)));
            }
        }
        for (cell_id, entry) in &overlay {
            let dangling = !arena.contains(*cell_id) || entry.replacements.iter().any(|id| !arena.contains(*id));
            if dangling {
                return Err(invalid(format!("overlay entry of cell {} references missing cells", cell_id)));
            }
        }
        let mut patches = Vec::with_capacity(patch_members.len());
        for (id, flags, members) in patch_members {
            if let Some(missing) = members.iter().find(|m| !arena.contains(**m)) {
                return Err(invalid(format!("patch {} references missing cell {}", id, missing)));
            }
            patches.push(CellsPatch::restore(id, flags, members, &arena, &grid_cells));
        }

        let grid_boxes: Vec<_> = grid_cells.values().map(|g| (g.id(), *g.aabb())).collect();
        {
            let mut data = self.data.write();
            let mut regions = self.regions.write();
            let mut patch_state = self.patches.write();
            *data = NavmeshData {
                arena,
                grid_cells,
                ids: IdGenerator::from_counters(next_cell, next_grid, next_patch),
                added_cells: Vec::new(),
                patches_dirty,
            };
            *regions = RegionState {
                requested,
                dirty: regions_dirty,
                overlay,
                blockers,
            };
            *patch_state = PatchState { patches, version };
        }

        tracing::info!("Restored navmesh snapshot with {} grid cells", grid_boxes.len());
        self.notify_restored(&grid_boxes);
        Ok(())
    }

    /// Write a snapshot file.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_snapshot(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a snapshot file.
    pub fn load_snapshot(&self, path: &Path) -> Result<()> {
        let mut reader = BufReader::new(File::open(path)?);
        self.read_snapshot(&mut reader)
    }
}
