//! Change notifications published by the navmesh.

use crate::geometry::Aabb;
use crate::ids::GridCellId;

/// Receives navmesh change events.
///
/// Callbacks run on the thread that made the change, after the navmesh has
/// released its locks, so implementations may query the navmesh. Keep them
/// short; forwarding into a channel is the usual pattern.
pub trait NavmeshObserver: Send + Sync {
    /// A new grid cell was inserted (or cells were merged into an existing one).
    fn on_grid_cell_added(&self, _id: GridCellId, _aabb: &Aabb) {}

    /// Navigation data inside `aabb` changed (new cells or overlay updates).
    fn on_nav_data_changed(&self, _aabb: &Aabb) {}

    /// Everything was removed.
    fn on_navmesh_cleared(&self) {}
}
