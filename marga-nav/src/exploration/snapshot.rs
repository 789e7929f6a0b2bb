//! Binary snapshots of the frontier graph.
//!
//! Format (little-endian, primitives from `bhumi_mesh::io`):
//! - Header: magic "MGEX", version u8
//! - Next id, seen patch version
//! - Cells: id, box, square, navmesh cells, reach, area, flags, patches,
//!   neighbour edges
//!
//! The distance cache is rebuilt from the restored edges.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use bhumi_mesh::io::{BinReader, BinWriter};
use bhumi_mesh::{MovementFlags, Neighbour};

use super::engine::{ExplorationEngine, ExploreState};
use super::explore_cell::{ExploreCell, ExploreMap};
use crate::error::{MargaError, Result};

const MAGIC: &[u8; 4] = b"MGEX";
const VERSION: u8 = 1;

fn invalid(msg: String) -> MargaError {
    MargaError::Snapshot(msg)
}

impl ExplorationEngine {
    /// Write every frontier cell with its flags and edges.
    pub fn write_snapshot<W: Write>(&self, writer: &mut W) -> Result<()> {
        let state = self.state.read();
        let mut w = BinWriter::new(writer);

        w.header(MAGIC, VERSION)?;
        w.u32(state.next_id)?;
        w.u64(state.patches_version_seen)?;

        w.len(state.map.len())?;
        for cell in state.map.iter() {
            w.u32(cell.id)?;
            w.aabb(&cell.aabb)?;
            w.u32(cell.square.0 as u32)?;
            w.u32(cell.square.1 as u32)?;
            w.ids(&cell.cells)?;
            let reach: Vec<u32> = cell.reach.iter().copied().collect();
            w.ids(&reach)?;
            w.f32(cell.area)?;
            w.bool(cell.explored)?;
            w.bool(cell.delayed)?;
            w.bool(cell.small)?;
            w.ids(&cell.patches)?;
            w.len(cell.neighbours().len())?;
            for n in cell.neighbours() {
                w.u32(n.cell_id)?;
                w.vec3(n.border_point)?;
                w.f32(n.distance)?;
            }
        }
        Ok(())
    }

    /// Replace the frontier graph with a snapshot.
    ///
    /// Edges must reference restored cells and be stored on both ends. On
    /// error the current state is left unchanged.
    pub fn read_snapshot<R: Read>(&self, reader: &mut R) -> Result<()> {
        let mut r = BinReader::new(reader);
        r.header(MAGIC, VERSION)?;

        let next_id = r.u32()?;
        let patches_version_seen = r.u64()?;

        let mut map = ExploreMap::default();
        for _ in 0..r.len()? {
            let id = r.u32()?;
            let aabb = r.aabb()?;
            let square = (r.u32()? as i32, r.u32()? as i32);
            let cells = r.ids()?;
            let reach: BTreeSet<u32> = r.ids()?.into_iter().collect();
            let area = r.f32()?;
            let explored = r.bool()?;
            let delayed = r.bool()?;
            let small = r.bool()?;
            let patches = r.ids()?;
            let mut neighbours = Vec::new();
            for _ in 0..r.len()? {
                neighbours.push(Neighbour {
                    cell_id: r.u32()?,
                    border_point: r.vec3()?,
                    connection_flags: MovementFlags::WALK,
                    distance: r.f32()?,
                });
            }

            if id >= next_id {
                return Err(invalid(format!("frontier cell {} not below next id {}", id, next_id)));
            }
            if map.get(id).is_some() {
                return Err(invalid(format!("duplicate frontier cell {}", id)));
            }
            if map.at_square(square).is_some() {
                return Err(invalid(format!("two frontier cells in square {:?}", square)));
            }
            map.insert(ExploreCell {
                id,
                aabb,
                square,
                cells,
                area,
                explored,
                delayed,
                small,
                patches,
                neighbours,
                reach,
            });
        }

        if !map.is_symmetric() {
            return Err(invalid("frontier edges are dangling or one-sided".to_string()));
        }

        let mut state = ExploreState {
            map,
            next_id,
            patches_version_seen,
            membership_dirty: false,
            ..Default::default()
        };
        state.rebuild_cache();

        let count = state.map.len();
        *self.state.write() = state;
        tracing::info!("Restored {} frontier cells", count);
        Ok(())
    }
}
