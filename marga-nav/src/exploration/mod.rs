//! Frontier exploration.
//!
//! Discovered terrain is tiled into square frontier cells ([`ExploreCell`]).
//! [`ExplorationEngine`] tracks which of them the agent has seen and feeds the
//! next unexplored one to the navigation engine as an `Explore` destination.

mod engine;
mod explore_cell;
mod snapshot;
mod tiling;

use serde::{Deserialize, Serialize};

pub use engine::{ExplorationEngine, ExploreObserver};
pub use explore_cell::{ExploreCell, ExploreCellId, ExploreMap};

/// How the next frontier cell is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExploreStrategy {
    /// Lowest `distance - reward * explored_neighbour_fraction`
    #[default]
    Nearest,
    /// First stop of a 2-opt visiting order
    TwoOpt,
    /// First stop of a simulated-annealing visiting order
    Annealing,
}
