//! Agent navigation over a navmesh.
//!
//! [`NavigationEngine`] arbitrates destinations by priority, keeps a path to
//! the active one, follows it and reacts to getting stuck or threatened.

mod anti_stuck;
mod destination;
mod engine;
mod follow;
mod path;
mod snapshot;
mod threat;

pub use anti_stuck::{AntiStuck, AntiStuckStatus};
pub use destination::{DestType, Destination, Priorities, StopBehavior};
pub use engine::NavigationEngine;
pub use follow::{FollowStep, PathFollowStrategy};
pub use path::PathData;
pub use threat::{ThreatAhead, ThreatTracker};
