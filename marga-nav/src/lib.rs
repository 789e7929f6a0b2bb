//! MargaNav - navigation and exploration engines for bhumi-mesh navmeshes
//!
//! Two engines run on top of a shared [`bhumi_mesh::Navmesh`]:
//!
//! - [`NavigationEngine`]: arbitrates destinations by priority, maintains a
//!   path to the active one and turns it into a movement target, with
//!   anti-stuck escalation and threat avoidance
//! - [`ExplorationEngine`]: tiles discovered terrain into frontier cells and
//!   feeds the next unexplored one to the navigation engine
//!
//! Each engine (and the navmesh overlay) runs its own fixed-interval loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bhumi_mesh::{Navmesh, Vec3};
//! use marga_nav::{DestType, Destination, MargaConfig, NavigationEngine};
//!
//! let config = MargaConfig::default();
//! let navmesh = Arc::new(Navmesh::new(config.navmesh.clone()));
//! navmesh.load_file(std::path::Path::new("level.txt")).unwrap();
//!
//! let nav = Arc::new(NavigationEngine::new(&config, Arc::clone(&navmesh)));
//! nav.set_current_pos(Vec3::new(1.0, 1.0, 0.0));
//! nav.set_destination(Destination::new(DestType::User, Vec3::new(40.0, 12.0, 0.0), 0.5));
//! nav.update().unwrap();
//! let next = nav.go_to_position();
//! ```

pub mod config;
pub mod error;
pub mod exploration;
pub mod navigation;

pub use config::{
    AntiStuckConfig, ExplorationConfig, MargaConfig, NavigationConfig, SimulationConfig, ThreatConfig,
};
pub use error::{MargaError, Result};
pub use exploration::{ExplorationEngine, ExploreCell, ExploreCellId, ExploreObserver, ExploreStrategy};
pub use navigation::{
    DestType, Destination, FollowStep, NavigationEngine, PathData, PathFollowStrategy, Priorities, StopBehavior,
    ThreatAhead,
};
