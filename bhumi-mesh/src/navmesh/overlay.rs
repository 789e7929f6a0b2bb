//! Region overlay: replaces region-covered cells by split replacement cells.
//!
//! Per base walkable cell the set of overlapping regions is tracked. A cell
//! whose set changed is disabled (keeping its edges) and carved into
//! replacement cells, which are wired to the original's former neighbours
//! or, where a neighbour is itself replaced, to that neighbour's
//! replacements. When the set becomes empty the replacements are dropped and
//! the original is enabled again. Cells whose set did not change are left
//! alone, so reapplying the same regions causes no churn.

use std::collections::BTreeMap;

use super::NavmeshData;
use crate::cell::{Cell, ConnectParams};
use crate::config::NavmeshConfig;
use crate::flags::MovementFlags;
use crate::geometry::Aabb;
use crate::ids::CellId;
use crate::region::{Region, split_cell_by_regions};

/// Replacement bookkeeping for one original cell.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct OverlayEntry {
    pub(crate) regions: Vec<Region>,
    pub(crate) replacements: Vec<CellId>,
}

/// Region input and overlay bookkeeping.
#[derive(Clone, Debug, Default)]
pub(crate) struct RegionState {
    pub(crate) requested: Vec<Region>,
    pub(crate) dirty: bool,
    pub(crate) overlay: BTreeMap<CellId, OverlayEntry>,
    pub(crate) blockers: Vec<Region>,
}

/// What one overlay pass changed.
#[derive(Clone, Debug, Default)]
pub struct OverlayStats {
    pub created: usize,
    pub removed: usize,
    pub enable_flips: usize,
    pub blockers_changed: bool,
    /// Boxes of originals whose replacement set changed
    pub changed: Vec<Aabb>,
}

impl OverlayStats {
    /// Whether patches must be rebuilt.
    pub fn needs_patch_rebuild(&self) -> bool {
        self.created > 0 || self.removed > 0 || self.enable_flips > 0 || self.blockers_changed
    }
}

fn overlaps(region: &Region, aabb: &Aabb) -> bool {
    region.aabb.overlaps_area_2d(aabb) && region.aabb.min.z <= aabb.max.z && region.aabb.max.z >= aabb.min.z
}

fn neighbour_ids(data: &NavmeshData, id: CellId) -> Vec<CellId> {
    data.arena
        .get(id)
        .map(|c| c.neighbours().iter().map(|n| n.cell_id).collect())
        .unwrap_or_default()
}

/// Connect `cell` to each peer, or to a disabled peer's replacements.
fn wire_to_neighbourhood(
    data: &mut NavmeshData,
    state: &RegionState,
    cell: CellId,
    peers: &[CellId],
    params: ConnectParams,
) {
    for &peer in peers {
        if peer == cell {
            continue;
        }
        let enabled = data.arena.get(peer).is_some_and(|c| c.is_enabled());
        if enabled {
            data.arena.connect(cell, peer, params);
        } else if let Some(entry) = state.overlay.get(&peer) {
            for &r in &entry.replacements {
                data.arena.connect(cell, r, params);
            }
        }
    }
}

fn set_enabled(data: &mut NavmeshData, id: CellId, enabled: bool, stats: &mut OverlayStats) {
    if let Some(cell) = data.arena.get_mut(id) {
        if cell.disabled == enabled {
            cell.disabled = !enabled;
            stats.enable_flips += 1;
        }
    }
}

fn remove_replacement(data: &mut NavmeshData, id: CellId) {
    if let Some(cell) = data.arena.remove(id) {
        if let Some(grid) = data.grid_cells.get_mut(&cell.owner) {
            grid.remove_replacement(id);
        }
    }
}

/// Run one overlay pass.
pub(crate) fn apply(data: &mut NavmeshData, state: &mut RegionState, config: &NavmeshConfig) -> OverlayStats {
    let params = config.connect_params();
    let mut stats = OverlayStats::default();

    // Base cells added since the last pass only know the originals; give the
    // originals' replacements the same edges.
    let added = std::mem::take(&mut data.added_cells);
    for &cell_id in &added {
        for peer in neighbour_ids(data, cell_id) {
            if let Some(entry) = state.overlay.get(&peer) {
                for &r in &entry.replacements {
                    data.arena.connect(r, cell_id, params);
                }
            }
        }
    }

    if !state.dirty && added.is_empty() {
        return stats;
    }
    state.dirty = false;

    let base_ids: Vec<CellId> = data
        .arena
        .iter()
        .filter(|c| !c.is_replacement() && c.has_flags(MovementFlags::WALK))
        .map(|c| c.id)
        .collect();

    for id in base_ids {
        let Some(cell) = data.arena.get(id) else {
            continue;
        };
        let aabb = cell.aabb;
        let (flags, owner, cost, threat) = (cell.flags, cell.owner, cell.movement_cost_mult, cell.threat);

        let overlapping: Vec<Region> = state.requested.iter().filter(|r| overlaps(r, &aabb)).copied().collect();
        let unchanged = match state.overlay.get(&id) {
            Some(entry) => entry.regions == overlapping,
            None => overlapping.is_empty(),
        };
        if unchanged {
            continue;
        }

        if let Some(entry) = state.overlay.remove(&id) {
            for r in entry.replacements {
                remove_replacement(data, r);
                stats.removed += 1;
            }
        }
        stats.changed.push(aabb);

        let former = neighbour_ids(data, id);
        if overlapping.is_empty() {
            set_enabled(data, id, true, &mut stats);
            wire_to_neighbourhood(data, state, id, &former, params);
            continue;
        }

        set_enabled(data, id, false, &mut stats);
        let pieces = split_cell_by_regions(
            &aabb,
            cost,
            threat,
            &overlapping,
            config.cost_combine,
            config.min_replacement_area,
        );

        let mut replacements = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let rid = data.ids.next_cell();
            data.arena.insert(Cell::new_replacement(
                rid,
                piece.aabb,
                flags,
                owner,
                piece.movement_cost_mult,
                piece.threat,
            ));
            if let Some(grid) = data.grid_cells.get_mut(&owner) {
                grid.push_replacement(rid);
            }
            for &sibling in &replacements {
                data.arena.connect(rid, sibling, params);
            }
            wire_to_neighbourhood(data, state, rid, &former, params);
            replacements.push(rid);
            stats.created += 1;
        }

        state.overlay.insert(
            id,
            OverlayEntry {
                regions: overlapping,
                replacements,
            },
        );
    }

    let blockers: Vec<Region> = state.requested.iter().filter(|r| r.is_blocker()).copied().collect();
    if blockers != state.blockers {
        stats.blockers_changed = true;
        state.blockers = blockers;
    }

    if stats.needs_patch_rebuild() {
        tracing::debug!(
            "Overlay pass: {} replacements created, {} removed, {} enable flips, blockers changed: {}",
            stats.created,
            stats.removed,
            stats.enable_flips,
            stats.blockers_changed
        );
    }
    stats
}
