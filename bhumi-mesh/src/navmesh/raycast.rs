//! Box-marching ray test.

use std::collections::HashSet;

use crate::algorithms::graph::passable_peer;
use crate::arena::CellArena;
use crate::flags::MovementFlags;
use crate::geometry::Vec3;
use crate::ids::CellId;

/// Slack used when deciding whether an exit point lies on a neighbour.
const BOUNDARY_EPS: f32 = 1e-3;
const T_EPS: f32 = 1e-6;

/// Result of a ray cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastResult {
    /// The whole segment lies on connected cells
    pub clear: bool,
    /// Segment end when clear, otherwise the point where the ray left the mesh
    pub end: Vec3,
}

/// March the segment `origin -> end` from cell `start` through neighbours.
///
/// At each step the ray's exit point from the current cell is computed and
/// the first unvisited neighbour that contains it and continues the segment
/// is entered. The visited set guarantees termination.
pub(crate) fn march(
    arena: &CellArena,
    start: CellId,
    origin: Vec3,
    end: Vec3,
    flags: MovementFlags,
    use_z: bool,
) -> RayCastResult {
    let mut visited: HashSet<CellId> = HashSet::from([start]);
    let mut current = start;

    loop {
        let Some(cell) = arena.get(current) else {
            return RayCastResult { clear: false, end: origin };
        };

        // Origin not inside the start box (nearest-cell fallback): exits at once
        let t_exit = cell
            .aabb
            .segment_interval(origin, end, use_z)
            .map_or(0.0, |(_, t1)| t1);
        if t_exit >= 1.0 - T_EPS {
            return RayCastResult { clear: true, end };
        }
        let exit = origin.lerp(end, t_exit);

        let mut next = None;
        for edge in cell.neighbours() {
            if visited.contains(&edge.cell_id) {
                continue;
            }
            let Some(peer) = passable_peer(arena, edge, flags) else {
                continue;
            };
            let on_peer = if use_z {
                peer.aabb.contains_tol(exit, BOUNDARY_EPS, BOUNDARY_EPS)
            } else {
                peer.aabb.contains_2d_tol(exit, BOUNDARY_EPS)
            };
            if !on_peer {
                continue;
            }
            let continues = peer
                .aabb
                .segment_interval(origin, end, use_z)
                .is_some_and(|(_, t1)| t1 > t_exit + T_EPS);
            if continues {
                next = Some(edge.cell_id);
                break;
            }
        }

        match next {
            Some(id) => {
                visited.insert(id);
                current = id;
            }
            None => return RayCastResult { clear: false, end: exit },
        }
    }
}
