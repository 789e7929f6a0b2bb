//! Graph abstraction shared by the search and visiting algorithms.
//!
//! Implemented by the navmesh cell arena and by the exploration frontier map,
//! so A* and breadth-first visiting run unchanged over both.

use crate::arena::CellArena;
use crate::cell::{Cell, Neighbour};
use crate::flags::MovementFlags;
use crate::geometry::{Aabb, Vec3};

/// Node of a box graph.
pub trait GraphNode {
    fn id(&self) -> u32;
    fn aabb(&self) -> &Aabb;
    fn flags(&self) -> MovementFlags;
    fn is_enabled(&self) -> bool;
    fn edges(&self) -> &[Neighbour];

    /// Multiplier applied to distance travelled through the node.
    fn movement_cost(&self) -> f32 {
        1.0
    }

    /// Threat of standing in the node.
    fn threat(&self) -> f32 {
        0.0
    }

    fn center(&self) -> Vec3 {
        self.aabb().center()
    }
}

/// Lookup of nodes by id.
pub trait CellGraph {
    type Node: GraphNode;

    fn node(&self, id: u32) -> Option<&Self::Node>;
}

/// Graph whose edges can be removed during a visit.
pub trait MutableCellGraph: CellGraph {
    /// Remove both halves of the edge between `a` and `b`.
    fn remove_edge(&mut self, a: u32, b: u32) -> bool;
}

impl GraphNode for Cell {
    fn id(&self) -> u32 {
        self.id
    }

    fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    fn flags(&self) -> MovementFlags {
        self.flags
    }

    fn is_enabled(&self) -> bool {
        Cell::is_enabled(self)
    }

    fn edges(&self) -> &[Neighbour] {
        self.neighbours()
    }

    fn movement_cost(&self) -> f32 {
        self.movement_cost_mult
    }

    fn threat(&self) -> f32 {
        self.threat
    }
}

impl CellGraph for CellArena {
    type Node = Cell;

    fn node(&self, id: u32) -> Option<&Cell> {
        self.get(id)
    }
}

impl MutableCellGraph for CellArena {
    fn remove_edge(&mut self, a: u32, b: u32) -> bool {
        self.disconnect(a, b)
    }
}

/// Peer node of `edge` when the edge can be traversed under `flags`.
pub fn passable_peer<'a, G: CellGraph>(graph: &'a G, edge: &Neighbour, flags: MovementFlags) -> Option<&'a G::Node> {
    if !edge.connection_flags.contains(flags) {
        return None;
    }
    graph
        .node(edge.cell_id)
        .filter(|n| n.is_enabled() && n.flags().contains(flags))
}
