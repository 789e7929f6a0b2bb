//! # Bhumi-Mesh: Box-Cell Navigation Graph
//!
//! Axis-aligned box cells connected by shared faces, bucketed into grid
//! cells, with a region overlay that carves cost and threat areas into
//! replacement cells and connectivity patches for O(patches) reachability.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bhumi_mesh::{Aabb, GridCellData, MovementFlags, Navmesh, Vec3};
//!
//! let navmesh = Navmesh::default();
//! navmesh.add(GridCellData::single(Aabb::from_coords(0.0, 0.0, 0.0, 10.0, 10.0, 0.0)), true);
//! navmesh.add(GridCellData::single(Aabb::from_coords(10.0, 0.0, 0.0, 20.0, 10.0, 0.0)), true);
//! navmesh.update();
//!
//! let connected = navmesh.are_connected(
//!     Vec3::new(1.0, 1.0, 0.0),
//!     Vec3::new(19.0, 9.0, 0.0),
//!     MovementFlags::WALK,
//!     0.5,
//!     0.5,
//! );
//! assert!(connected.is_some());
//! ```
//!
//! ## Architecture
//!
//! - [`geometry`]: Points, boxes, height planes
//! - [`cell`] / [`arena`]: Cells and the id-keyed store holding their edges
//! - [`grid_cell`]: Spatial buckets of cells
//! - [`region`]: Cost/threat regions and box splitting
//! - [`patch`]: Connected components
//! - [`navmesh`]: The concurrent owner of all of the above
//! - [`algorithms`]: A*, visiting, distance cache, route ordering
//! - [`io`]: Text format and binary snapshots
//! - [`worker`]: Periodic background loop

pub mod algorithms;
pub mod arena;
pub mod cell;
pub mod config;
pub mod error;
pub mod flags;
pub mod geometry;
pub mod grid_cell;
pub mod ids;
pub mod io;
pub mod navmesh;
pub mod patch;
pub mod region;
pub mod worker;

pub use arena::CellArena;
pub use cell::{Cell, ConnectParams, Neighbour};
pub use config::NavmeshConfig;
pub use error::{NavmeshError, Result};
pub use flags::MovementFlags;
pub use geometry::{Aabb, Plane, Vec3};
pub use grid_cell::{CellData, GridCell, GridCellData};
pub use ids::{CellId, GridCellId, IdGenerator, PatchId};
pub use navmesh::{Navmesh, NavmeshObserver, OverlayStats, RayCastResult, UpdateStats};
pub use patch::CellsPatch;
pub use region::{CostCombine, Region};
pub use worker::WorkerLoop;
