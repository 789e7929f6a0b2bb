//! Live path state written by the navigation tick.

use std::time::{Duration, Instant};

use bhumi_mesh::algorithms::{PathOutcome, SearchResult};
use bhumi_mesh::{CellId, Vec3};

use super::destination::Destination;

/// Path currently followed by the agent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathData {
    /// Start point, border points, final point
    pub points: Vec<Vec3>,
    /// Traversed cell ids
    pub nodes: Vec<CellId>,
    /// Index of the next point to head for
    pub next_index: usize,
    /// Truncated long-range path
    pub rough: bool,
    /// Last kept waypoint of a rough path; reaching its radius forces a recompute
    pub trigger: Option<Vec3>,
    /// Destination the path was computed for
    pub destination: Option<Destination>,
    /// Outcome of the last search
    pub outcome: Option<PathOutcome>,
    /// Point the agent should move to now
    pub target: Option<Vec3>,
    pub computed_at: Option<Instant>,
}

impl PathData {
    /// Path from a search result, truncated to `max_nodes` nodes.
    pub fn from_search(result: &SearchResult, destination: Destination, max_nodes: usize, now: Instant) -> Self {
        let mut path = Self {
            destination: Some(destination),
            outcome: Some(result.outcome),
            computed_at: Some(now),
            ..Default::default()
        };
        if !result.has_path() {
            return path;
        }

        path.points = result.points.clone();
        path.nodes = result.nodes.clone();

        // Points are one longer than nodes: the start point comes first
        if max_nodes > 0 && path.nodes.len() > max_nodes {
            path.nodes.truncate(max_nodes);
            path.points.truncate(max_nodes + 1);
            path.rough = true;
            path.trigger = path.points.last().copied();
        }
        // The start point is where the agent already is
        path.next_index = 1.min(path.points.len().saturating_sub(1));
        path
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points not yet reached.
    pub fn remaining(&self) -> &[Vec3] {
        self.points.get(self.next_index..).unwrap_or(&[])
    }

    /// Time since the path was computed.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.computed_at.map(|t| now.saturating_duration_since(t))
    }

    /// Whether the agent entered the rough-path trigger radius.
    pub fn trigger_reached(&self, pos: Vec3, radius: f32) -> bool {
        self.rough && self.trigger.is_some_and(|t| t.distance_2d(pos) <= radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::DestType;

    fn result(n: usize) -> SearchResult {
        SearchResult {
            outcome: PathOutcome::Found,
            nodes: (0..n as u32).collect(),
            points: (0..=n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
            cost: n as f32,
            expanded: n,
        }
    }

    #[test]
    fn test_long_path_becomes_rough() {
        let dest = Destination::new(DestType::User, Vec3::new(50.0, 0.0, 0.0), 0.5);
        let path = PathData::from_search(&result(40), dest, 10, Instant::now());
        assert!(path.rough);
        assert_eq!(path.nodes.len(), 10);
        assert_eq!(path.points.len(), 11);
        assert_eq!(path.trigger, Some(Vec3::new(10.0, 0.0, 0.0)));
        assert!(path.trigger_reached(Vec3::new(8.0, 0.0, 0.0), 3.0));
        assert!(!path.trigger_reached(Vec3::new(2.0, 0.0, 0.0), 3.0));
    }

    #[test]
    fn test_short_path_kept_whole() {
        let dest = Destination::new(DestType::User, Vec3::new(3.0, 0.0, 0.0), 0.5);
        let path = PathData::from_search(&result(3), dest, 10, Instant::now());
        assert!(!path.rough);
        assert_eq!(path.points.len(), 4);
        assert_eq!(path.next_index, 1);
        assert_eq!(path.remaining().len(), 3);
    }
}
