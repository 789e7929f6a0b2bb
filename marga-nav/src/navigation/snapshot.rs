//! Binary snapshots of the navigation state.
//!
//! Format (little-endian, primitives from `bhumi_mesh::io`):
//! - Header: magic "MGNV", version u8
//! - Position, active and suspended destinations
//! - Waypoints, index, cycle flag
//! - Position history, back-track flag
//! - Live path: points, nodes, next index, rough flag, trigger, target,
//!   destination, outcome
//!
//! Path nodes refer to navmesh cell ids; restore the navmesh first.

use std::io::{Read, Write};

use bhumi_mesh::algorithms::PathOutcome;
use bhumi_mesh::Vec3;
use bhumi_mesh::io::{BinReader, BinWriter};

use super::destination::{DestType, Destination, StopBehavior};
use super::engine::NavigationEngine;
use super::path::PathData;
use crate::error::{MargaError, Result};

const MAGIC: &[u8; 4] = b"MGNV";
const VERSION: u8 = 1;

fn write_destination<W: Write>(w: &mut BinWriter<'_, W>, dest: Option<&Destination>) -> Result<()> {
    let Some(dest) = dest else {
        w.bool(false)?;
        return Ok(());
    };
    w.bool(true)?;
    w.vec3(dest.position)?;
    w.f32(dest.precision)?;
    w.u8(dest.kind.to_u8())?;
    w.bool(dest.stop == StopBehavior::Hold)?;
    w.bool(dest.tag.is_some())?;
    w.u64(dest.tag.unwrap_or(0))?;
    Ok(())
}

fn read_destination<R: Read>(r: &mut BinReader<'_, R>) -> Result<Option<Destination>> {
    if !r.bool()? {
        return Ok(None);
    }
    let position = r.vec3()?;
    let precision = r.f32()?;
    let code = r.u8()?;
    let kind = DestType::from_u8(code).ok_or_else(|| MargaError::Snapshot(format!("bad destination kind {}", code)))?;
    let hold = r.bool()?;
    let has_tag = r.bool()?;
    let tag = r.u64()?;
    Ok(Some(Destination {
        position,
        precision,
        kind,
        stop: if hold { StopBehavior::Hold } else { StopBehavior::Clear },
        tag: has_tag.then_some(tag),
    }))
}

fn outcome_code(outcome: Option<PathOutcome>) -> u8 {
    match outcome {
        None => 0,
        Some(PathOutcome::Found) => 1,
        Some(PathOutcome::Partial) => 2,
        Some(PathOutcome::NotFound) => 3,
        Some(PathOutcome::TimedOut) => 4,
    }
}

fn outcome_from_code(code: u8) -> Result<Option<PathOutcome>> {
    match code {
        0 => Ok(None),
        1 => Ok(Some(PathOutcome::Found)),
        2 => Ok(Some(PathOutcome::Partial)),
        3 => Ok(Some(PathOutcome::NotFound)),
        4 => Ok(Some(PathOutcome::TimedOut)),
        other => Err(MargaError::Snapshot(format!("bad path outcome {}", other))),
    }
}

fn write_points<W: Write>(w: &mut BinWriter<'_, W>, points: impl ExactSizeIterator<Item = Vec3>) -> Result<()> {
    w.len(points.len())?;
    for p in points {
        w.vec3(p)?;
    }
    Ok(())
}

fn read_points<R: Read>(r: &mut BinReader<'_, R>) -> Result<Vec<Vec3>> {
    let n = r.len()?;
    let mut points = Vec::with_capacity(n.min(4096));
    for _ in 0..n {
        points.push(r.vec3()?);
    }
    Ok(points)
}

impl NavigationEngine {
    /// Write destinations, waypoints, history and the live path.
    pub fn write_snapshot<W: Write>(&self, writer: &mut W) -> Result<()> {
        let control = self.control.read();
        let path = self.path.read();
        let mut w = BinWriter::new(writer);

        w.header(MAGIC, VERSION)?;
        w.vec3(control.position)?;
        write_destination(&mut w, control.destination.as_ref())?;
        write_destination(&mut w, control.suspended.as_ref())?;

        write_points(&mut w, control.waypoints.iter().copied())?;
        w.len(control.waypoint_index)?;
        w.bool(control.cycle_waypoints)?;
        write_points(&mut w, control.history.iter().copied())?;
        w.bool(control.backtrack)?;

        write_points(&mut w, path.points.iter().copied())?;
        w.ids(&path.nodes)?;
        w.len(path.next_index)?;
        w.bool(path.rough)?;
        w.option_vec3(path.trigger)?;
        w.option_vec3(path.target)?;
        write_destination(&mut w, path.destination.as_ref())?;
        w.u8(outcome_code(path.outcome))?;
        Ok(())
    }

    /// Replace the navigation state with a snapshot.
    ///
    /// Path nodes must exist in the navmesh. On error the current state is
    /// left unchanged.
    pub fn read_snapshot<R: Read>(&self, reader: &mut R) -> Result<()> {
        let mut r = BinReader::new(reader);
        r.header(MAGIC, VERSION)?;

        let position = r.vec3()?;
        let destination = read_destination(&mut r)?;
        let suspended = read_destination(&mut r)?;
        let waypoints = read_points(&mut r)?;
        let waypoint_index = r.len()?;
        let cycle_waypoints = r.bool()?;
        let history = read_points(&mut r)?;
        let backtrack = r.bool()?;

        let points = read_points(&mut r)?;
        let nodes = r.ids()?;
        let next_index = r.len()?;
        let rough = r.bool()?;
        let trigger = r.option_vec3()?;
        let target = r.option_vec3()?;
        let path_destination = read_destination(&mut r)?;
        let outcome = outcome_from_code(r.u8()?)?;

        if !points.is_empty() && (next_index >= points.len() || points.len() != nodes.len() + 1) {
            return Err(MargaError::Snapshot(format!(
                "path with {} points, {} nodes, next index {}",
                points.len(),
                nodes.len(),
                next_index
            )));
        }
        if waypoint_index > waypoints.len() {
            return Err(MargaError::Snapshot(format!(
                "waypoint index {} beyond {} waypoints",
                waypoint_index,
                waypoints.len()
            )));
        }
        if let Some(missing) = nodes.iter().find(|id| self.navmesh().cell(**id).is_none()) {
            return Err(MargaError::Snapshot(format!("path references unknown cell {}", missing)));
        }

        let path = PathData {
            points,
            nodes,
            next_index,
            rough,
            trigger,
            destination: path_destination,
            outcome,
            target,
            computed_at: None,
        };

        let mut control = self.control.write();
        control.position = position;
        control.destination = destination;
        control.suspended = suspended;
        control.waypoints = waypoints;
        control.waypoint_index = waypoint_index;
        control.cycle_waypoints = cycle_waypoints;
        control.history = history.into();
        control.backtrack = backtrack;
        control.recalc_requested = false;
        *self.path.write() = path;

        tracing::info!(
            "Restored navigation state: destination {:?}, {} history positions",
            control.destination.map(|d| d.kind),
            control.history.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use bhumi_mesh::{Aabb, GridCellData, Navmesh};

    use super::*;
    use crate::config::MargaConfig;

    fn corridor() -> Arc<Navmesh> {
        let navmesh = Arc::new(Navmesh::default());
        for i in 0..3 {
            let x = i as f32 * 10.0;
            navmesh.add(
                GridCellData::single(Aabb::from_coords(x, 0.0, 0.0, x + 10.0, 10.0, 0.0)),
                false,
            );
        }
        navmesh
    }

    #[test]
    fn test_round_trip() {
        let navmesh = corridor();
        let nav = NavigationEngine::new(&MargaConfig::default(), Arc::clone(&navmesh));
        nav.set_current_pos(Vec3::new(2.0, 5.0, 0.0));
        nav.set_current_pos(Vec3::new(4.0, 5.0, 0.0));
        nav.set_destination(Destination::new(DestType::Explore, Vec3::new(25.0, 5.0, 0.0), 0.5).with_tag(7));
        nav.update().unwrap();

        let mut buf = Vec::new();
        nav.write_snapshot(&mut buf).unwrap();

        let restored = NavigationEngine::new(&MargaConfig::default(), navmesh);
        restored.read_snapshot(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored.current_pos(), nav.current_pos());
        assert_eq!(restored.destination(), nav.destination());
        assert_eq!(restored.history(), nav.history());

        let (a, b) = (restored.path(), nav.path());
        assert_eq!(a.points, b.points);
        assert_eq!(a.nodes, b.nodes);
        assert_eq!(a.outcome, b.outcome);
        assert_eq!(a.destination.and_then(|d| d.tag), Some(7));
    }

    #[test]
    fn test_unknown_cell_rejected() {
        let navmesh = corridor();
        let nav = NavigationEngine::new(&MargaConfig::default(), Arc::clone(&navmesh));
        nav.set_current_pos(Vec3::new(2.0, 5.0, 0.0));
        nav.set_destination(Destination::new(DestType::User, Vec3::new(25.0, 5.0, 0.0), 0.5));
        nav.update().unwrap();
        let mut buf = Vec::new();
        nav.write_snapshot(&mut buf).unwrap();

        // Same state against an empty navmesh
        let other = NavigationEngine::new(&MargaConfig::default(), Arc::new(Navmesh::default()));
        let err = other.read_snapshot(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, MargaError::Snapshot(_)));
        assert!(other.destination().is_none());
    }
}
