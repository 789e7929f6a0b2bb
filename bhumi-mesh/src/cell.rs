//! Cell: the atomic navigable box of the navigation graph.
//!
//! Cells live in a [`CellArena`](crate::CellArena) and refer to each other by
//! [`CellId`]. Every edge is stored on both endpoints; [`Cell::add_neighbour`]
//! is the only way to create one so the relation stays symmetric.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::flags::MovementFlags;
use crate::geometry::{Aabb, Plane, Vec3};
use crate::ids::{CellId, GridCellId};

/// Geometric parameters for wiring two boxes together.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConnectParams {
    /// Horizontal slack when testing whether boxes touch
    pub tolerance: f32,
    /// Largest vertical gap bridged by an edge
    pub max_step_height: f32,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_step_height: 2.0,
        }
    }
}

/// One directed half of a symmetric neighbour edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    /// Peer cell
    pub cell_id: CellId,
    /// Centre of the shared border
    pub border_point: Vec3,
    /// Movement flags both cells support
    pub connection_flags: MovementFlags,
    /// Centre-to-centre distance when the edge was created
    pub distance: f32,
}

/// Navigable box with movement flags, cost, threat and neighbour edges.
#[derive(Clone, Debug)]
pub struct Cell {
    /// Stable id within the owning navmesh
    pub id: CellId,
    /// Box bounds
    pub aabb: Aabb,
    /// Supported movement
    pub flags: MovementFlags,
    /// Cost multiplier applied to distance travelled through the cell
    pub movement_cost_mult: f32,
    /// Threat level of standing in the cell
    pub threat: f32,
    /// Grid cell owning this cell
    pub owner: GridCellId,
    pub(crate) disabled: bool,
    pub(crate) replacement: bool,
    neighbours: Vec<Neighbour>,
    align_plane: OnceLock<Plane>,
}

impl Cell {
    /// Create a detached base cell.
    pub fn new(id: CellId, aabb: Aabb, flags: MovementFlags, owner: GridCellId) -> Self {
        Self {
            id,
            aabb,
            flags,
            movement_cost_mult: 1.0,
            threat: 0.0,
            owner,
            disabled: false,
            replacement: false,
            neighbours: Vec::new(),
            align_plane: OnceLock::new(),
        }
    }

    /// Create a detached region replacement cell.
    pub fn new_replacement(
        id: CellId,
        aabb: Aabb,
        flags: MovementFlags,
        owner: GridCellId,
        movement_cost_mult: f32,
        threat: f32,
    ) -> Self {
        Self {
            movement_cost_mult,
            threat,
            replacement: true,
            ..Self::new(id, aabb, flags, owner)
        }
    }

    /// Box centre
    #[inline]
    pub fn center(&self) -> Vec3 {
        self.aabb.center()
    }

    /// Whether the cell takes part in navigation.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Whether the cell was generated by a region overlay.
    #[inline]
    pub fn is_replacement(&self) -> bool {
        self.replacement
    }

    /// Whether the cell supports all of `flags`.
    #[inline]
    pub fn has_flags(&self, flags: MovementFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Neighbour edges in creation order.
    #[inline]
    pub fn neighbours(&self) -> &[Neighbour] {
        &self.neighbours
    }

    /// Edge towards `id`, if connected.
    pub fn neighbour(&self, id: CellId) -> Option<&Neighbour> {
        self.neighbours.iter().find(|n| n.cell_id == id)
    }

    /// Whether an edge towards `id` exists.
    #[inline]
    pub fn is_neighbour(&self, id: CellId) -> bool {
        self.neighbour(id).is_some()
    }

    /// Connect with default parameters. See [`Cell::add_neighbour_with`].
    pub fn add_neighbour(&mut self, other: &mut Cell) -> bool {
        self.add_neighbour_with(other, ConnectParams::default())
    }

    /// Create a bidirectional edge if the boxes touch.
    ///
    /// Touching edges count, touching corners do not. The edge carries the
    /// common movement flags and the centre of the shared border. Returns
    /// `false` when the cells are already connected, identical, or do not touch.
    pub fn add_neighbour_with(&mut self, other: &mut Cell, params: ConnectParams) -> bool {
        if self.id == other.id || self.is_neighbour(other.id) {
            return false;
        }
        if self.aabb.vertical_gap(&other.aabb) > params.max_step_height {
            return false;
        }
        let Some(border) = self.aabb.intersection_2d_tolerant(&other.aabb, params.tolerance) else {
            return false;
        };

        let border_point = border.center();
        let connection_flags = self.flags & other.flags;
        let distance = self.center().distance(other.center());

        self.push_neighbour(Neighbour {
            cell_id: other.id,
            border_point,
            connection_flags,
            distance,
        });
        other.push_neighbour(Neighbour {
            cell_id: self.id,
            border_point,
            connection_flags,
            distance,
        });
        true
    }

    /// Remove the half-edge towards `id`. Arena code removes the other half.
    pub(crate) fn remove_neighbour(&mut self, id: CellId) -> bool {
        let before = self.neighbours.len();
        self.neighbours.retain(|n| n.cell_id != id);
        let removed = self.neighbours.len() != before;
        if removed {
            self.align_plane = OnceLock::new();
        }
        removed
    }

    /// Drop every half-edge, returning the former peers.
    pub(crate) fn take_neighbours(&mut self) -> Vec<Neighbour> {
        self.align_plane = OnceLock::new();
        std::mem::take(&mut self.neighbours)
    }

    /// Append a half-edge as-is (used by snapshot restore and arena wiring).
    pub(crate) fn push_neighbour(&mut self, neighbour: Neighbour) {
        self.neighbours.push(neighbour);
        self.align_plane = OnceLock::new();
    }

    /// Plane that best fits the cell's walkable connection points.
    ///
    /// Computed on first use and cached until the neighbour set changes.
    pub fn align_plane(&self) -> Plane {
        *self.align_plane.get_or_init(|| self.compute_align_plane())
    }

    /// Project a 2D point onto the cell's effective surface.
    pub fn align_point(&self, p: Vec3) -> Vec3 {
        let plane = self.align_plane();
        let x = p.x.clamp(self.aabb.min.x, self.aabb.max.x);
        let y = p.y.clamp(self.aabb.min.y, self.aabb.max.y);
        let z = plane.height_at(x, y).clamp(self.aabb.min.z, self.aabb.max.z);
        Vec3::new(x, y, z)
    }

    fn compute_align_plane(&self) -> Plane {
        let candidates = candidate_planes(&self.aabb);
        let points: Vec<Vec3> = self
            .neighbours
            .iter()
            .filter(|n| n.connection_flags.contains(MovementFlags::WALK))
            .map(|n| n.border_point)
            .collect();

        if points.is_empty() {
            return candidates[0];
        }

        let mut best = candidates[0];
        let mut best_error = f32::MAX;
        for plane in candidates {
            let error = points.iter().map(|p| plane.vertical_distance(*p)).sum::<f32>()
                / points.len() as f32;
            if error < best_error {
                best_error = error;
                best = plane;
            }
        }
        best
    }
}

/// Fixed candidate set: mid-height, floor, ceiling, and four ramps.
fn candidate_planes(aabb: &Aabb) -> Vec<Plane> {
    let (min, max) = (aabb.min, aabb.max);
    let mut planes = vec![
        Plane::horizontal(aabb.center().z),
        Plane::horizontal(min.z),
        Plane::horizontal(max.z),
    ];

    let dz = max.z - min.z;
    let dx = max.x - min.x;
    let dy = max.y - min.y;
    if dz > f32::EPSILON {
        if dx > f32::EPSILON {
            let a = dz / dx;
            planes.push(Plane { a, b: 0.0, c: min.z - a * min.x });
            planes.push(Plane { a: -a, b: 0.0, c: min.z + a * max.x });
        }
        if dy > f32::EPSILON {
            let b = dz / dy;
            planes.push(Plane { a: 0.0, b, c: min.z - b * min.y });
            planes.push(Plane { a: 0.0, b: -b, c: min.z + b * max.y });
        }
    }
    planes
}
