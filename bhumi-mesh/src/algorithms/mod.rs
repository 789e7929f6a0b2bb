//! Graph algorithms over box graphs: search, visiting, route ordering.

pub mod astar;
pub mod distance_cache;
pub mod graph;
pub mod route;
pub mod visit;

pub use astar::{
    DestinationStrategy, PathOutcome, PathStrategy, SearchOptions, SearchResult, ThreatEscapeStrategy, find_path,
};
pub use distance_cache::DistanceCache;
pub use graph::{CellGraph, GraphNode, MutableCellGraph, passable_peer};
pub use route::{AnnealingParams, order_simulated_annealing, order_two_opt, route_length};
pub use visit::{VisitOptions, Visited, visit_breadth_first, visit_depth_first_pruning};
