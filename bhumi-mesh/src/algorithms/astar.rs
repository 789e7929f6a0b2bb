//! A* search over box graphs.
//!
//! Costs are accumulated through the cells themselves: moving from a cell's
//! leading point (where the path entered it) to the border of the next cell
//! costs `distance × (1 + jitter) × movement_cost`. The goal is described by
//! a [`PathStrategy`], so the same search serves fixed destinations and
//! "get out of danger" queries.
//!
//! Ties between open nodes are broken by lower total cost, then lower
//! heuristic, then lower node id, so results do not depend on insertion order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use rand::Rng;

use super::graph::{CellGraph, GraphNode, passable_peer};
use crate::cell::Neighbour;
use crate::flags::MovementFlags;
use crate::geometry::{Aabb, Vec3};

/// Goal description consumed by [`find_path`].
pub trait PathStrategy<N: GraphNode> {
    /// Heuristic lower bound of the remaining cost from `from` inside `node`.
    fn min_distance(&self, node: &N, from: Vec3) -> f32;

    /// Whether reaching `node` completes the search.
    fn is_destination(&self, node: &N) -> bool;

    /// Optional gate on individual edges.
    fn is_valid_neighbour(&self, _from: &N, _edge: &Neighbour, _to: &N) -> bool {
        true
    }

    /// Final point of the path inside the destination node.
    fn target_point(&self, node: &N, from: Vec3) -> Vec3;
}

/// Reach a fixed point within `precision`.
#[derive(Clone, Copy, Debug)]
pub struct DestinationStrategy {
    pub target: Vec3,
    pub precision: f32,
}

impl DestinationStrategy {
    pub fn new(target: Vec3, precision: f32) -> Self {
        Self { target, precision }
    }
}

impl<N: GraphNode> PathStrategy<N> for DestinationStrategy {
    fn min_distance(&self, _node: &N, from: Vec3) -> f32 {
        from.distance(self.target)
    }

    fn is_destination(&self, node: &N) -> bool {
        node.aabb().distance(self.target) <= self.precision
    }

    fn target_point(&self, _node: &N, _from: Vec3) -> Vec3 {
        self.target
    }
}

/// Reach any node whose threat is below `threshold` and that does not overlap
/// one of the `avoid` boxes.
#[derive(Clone, Debug)]
pub struct ThreatEscapeStrategy {
    pub threshold: f32,
    pub avoid: Vec<Aabb>,
}

impl ThreatEscapeStrategy {
    pub fn new(threshold: f32, avoid: Vec<Aabb>) -> Self {
        Self { threshold, avoid }
    }
}

impl<N: GraphNode> PathStrategy<N> for ThreatEscapeStrategy {
    fn min_distance(&self, _node: &N, _from: Vec3) -> f32 {
        0.0
    }

    fn is_destination(&self, node: &N) -> bool {
        node.threat() < self.threshold && !self.avoid.iter().any(|a| a.overlaps_area_2d(node.aabb()))
    }

    fn target_point(&self, node: &N, _from: Vec3) -> Vec3 {
        node.center()
    }
}

/// Search parameters.
#[derive(Clone, Copy, Debug)]
pub struct SearchOptions {
    /// Movement flags every traversed node and edge must carry
    pub flags: MovementFlags,
    /// Upper bound of the random cost jitter (0 disables it)
    pub max_jitter: f32,
    /// Absolute time budget
    pub deadline: Option<Instant>,
    /// Return a partial path instead of failing when the goal is unreachable
    pub allow_disconnected: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            flags: MovementFlags::WALK,
            max_jitter: 0.0,
            deadline: None,
            allow_disconnected: false,
        }
    }
}

/// How a search ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathOutcome {
    Found,
    /// Goal unreachable; path leads to the closest node by heuristic
    Partial,
    NotFound,
    /// Time budget exhausted before a result
    TimedOut,
}

/// Result of [`find_path`].
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    pub outcome: PathOutcome,
    /// Traversed node ids, start first
    pub nodes: Vec<u32>,
    /// Start point, border points, then the final point
    pub points: Vec<Vec3>,
    pub cost: f32,
    /// Number of closed nodes
    pub expanded: usize,
}

impl SearchResult {
    fn empty(outcome: PathOutcome, expanded: usize) -> Self {
        Self {
            outcome,
            nodes: Vec::new(),
            points: Vec::new(),
            cost: 0.0,
            expanded,
        }
    }

    #[inline]
    pub fn is_found(&self) -> bool {
        self.outcome == PathOutcome::Found
    }

    /// Whether the result carries a usable path.
    #[inline]
    pub fn has_path(&self) -> bool {
        matches!(self.outcome, PathOutcome::Found | PathOutcome::Partial)
    }

    #[inline]
    pub fn timed_out(&self) -> bool {
        self.outcome == PathOutcome::TimedOut
    }
}

struct Record {
    id: u32,
    parent: Option<usize>,
    g: f32,
    /// Heuristic from `leading`, refreshed when the record is closed
    h: f32,
    leading: Vec3,
    closed: bool,
}

#[derive(Clone, Copy)]
struct OpenEntry {
    f: f32,
    g: f32,
    h: f32,
    id: u32,
    index: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Run A* from `start` (entered at `start_point`) until `strategy` accepts a node.
pub fn find_path<G, S, R>(
    graph: &G,
    start: u32,
    start_point: Vec3,
    strategy: &S,
    options: &SearchOptions,
    rng: &mut R,
) -> SearchResult
where
    G: CellGraph,
    S: PathStrategy<G::Node>,
    R: Rng + ?Sized,
{
    let Some(start_node) = graph.node(start) else {
        return SearchResult::empty(PathOutcome::NotFound, 0);
    };

    let mut records = vec![Record {
        id: start,
        parent: None,
        g: 0.0,
        h: strategy.min_distance(start_node, start_point),
        leading: start_point,
        closed: false,
    }];
    let mut index_of: HashMap<u32, usize> = HashMap::new();
    index_of.insert(start, 0);

    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        f: records[0].h,
        g: 0.0,
        h: records[0].h,
        id: start,
        index: 0,
    });

    let mut expanded = 0usize;

    while let Some(entry) = open.pop() {
        if let Some(deadline) = options.deadline {
            if Instant::now() >= deadline {
                tracing::debug!("A* timed out after {} expansions", expanded);
                return SearchResult::empty(PathOutcome::TimedOut, expanded);
            }
        }

        let record = &mut records[entry.index];
        if record.closed || entry.g > record.g {
            continue;
        }
        record.closed = true;
        expanded += 1;

        let (current_g, current_leading) = (record.g, record.leading);
        let Some(node) = graph.node(entry.id) else {
            continue;
        };
        // Final estimate from the entry point the node was closed with
        records[entry.index].h = strategy.min_distance(node, current_leading);

        if strategy.is_destination(node) {
            let target = strategy.target_point(node, current_leading);
            let cost = current_g + current_leading.distance(target) * node.movement_cost().max(0.0);
            return build_result(&records, entry.index, start_point, target, cost, PathOutcome::Found, expanded);
        }

        let node_cost = node.movement_cost().max(0.0);
        for edge in node.edges() {
            let Some(peer) = passable_peer(graph, edge, options.flags) else {
                continue;
            };
            if !strategy.is_valid_neighbour(node, edge, peer) {
                continue;
            }

            let jitter = if options.max_jitter > 0.0 {
                rng.random_range(0.0..=options.max_jitter)
            } else {
                0.0
            };
            let g = current_g + current_leading.distance(edge.border_point) * (1.0 + jitter) * node_cost;

            let index = match index_of.get(&edge.cell_id) {
                Some(&i) => {
                    let existing = &mut records[i];
                    if existing.closed || g >= existing.g {
                        continue;
                    }
                    existing.g = g;
                    existing.parent = Some(entry.index);
                    existing.leading = edge.border_point;
                    i
                }
                None => {
                    let h = strategy.min_distance(peer, edge.border_point);
                    records.push(Record {
                        id: edge.cell_id,
                        parent: Some(entry.index),
                        g,
                        h,
                        leading: edge.border_point,
                        closed: false,
                    });
                    let i = records.len() - 1;
                    index_of.insert(edge.cell_id, i);
                    i
                }
            };

            let h = records[index].h;
            open.push(OpenEntry {
                f: g + h,
                g,
                h,
                id: edge.cell_id,
                index,
            });
        }
    }

    if options.allow_disconnected {
        let best = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.closed)
            .min_by(|(_, a), (_, b)| a.h.total_cmp(&b.h).then_with(|| a.id.cmp(&b.id)));
        if let Some((index, record)) = best {
            if let Some(node) = graph.node(record.id) {
                let target = node.aabb().closest_point(strategy.target_point(node, record.leading));
                let cost = record.g + record.leading.distance(target) * node.movement_cost().max(0.0);
                tracing::debug!("A* returning partial path to node {}", record.id);
                return build_result(&records, index, start_point, target, cost, PathOutcome::Partial, expanded);
            }
        }
    }

    SearchResult::empty(PathOutcome::NotFound, expanded)
}

fn build_result(
    records: &[Record],
    last: usize,
    start_point: Vec3,
    target: Vec3,
    cost: f32,
    outcome: PathOutcome,
    expanded: usize,
) -> SearchResult {
    let mut chain = Vec::new();
    let mut cursor = Some(last);
    while let Some(i) = cursor {
        chain.push(i);
        cursor = records[i].parent;
    }
    chain.reverse();

    let nodes: Vec<u32> = chain.iter().map(|&i| records[i].id).collect();
    let mut points = Vec::with_capacity(chain.len() + 1);
    points.push(start_point);
    points.extend(chain.iter().skip(1).map(|&i| records[i].leading));
    points.push(target);

    SearchResult {
        outcome,
        nodes,
        points,
        cost,
        expanded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::CellArena;
    use crate::cell::{Cell, ConnectParams};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn row_arena(xs: &[(u32, f32, f32)]) -> CellArena {
        let mut arena = CellArena::new();
        for &(id, x0, x1) in xs {
            arena.insert(Cell::new(
                id,
                Aabb::from_coords(x0, 0.0, 0.0, x1, 10.0, 0.0),
                MovementFlags::WALK,
                0,
            ));
        }
        let ids: Vec<u32> = arena.iter().map(|c| c.id).collect();
        for &a in &ids {
            for &b in &ids {
                if a < b {
                    arena.connect(a, b, ConnectParams::default());
                }
            }
        }
        arena
    }

    #[test]
    fn test_straight_corridor() {
        let arena = row_arena(&[(0, 0.0, 10.0), (1, 10.0, 20.0), (2, 20.0, 30.0)]);
        let mut rng = StdRng::seed_from_u64(1);
        let result = find_path(
            &arena,
            0,
            Vec3::new(5.0, 5.0, 0.0),
            &DestinationStrategy::new(Vec3::new(25.0, 5.0, 0.0), 0.0),
            &SearchOptions::default(),
            &mut rng,
        );

        assert!(result.is_found());
        assert_eq!(result.nodes, vec![0, 1, 2]);
        assert_eq!(result.points.len(), 4);
        assert_relative_eq!(result.cost, 20.0, epsilon = 1e-4);
    }

    #[test]
    fn test_cost_multiplier_steers_path() {
        // 0 -> {1 expensive, 2 cheap} -> 3, arranged as a 2x2 block
        let mut arena = CellArena::new();
        let boxes = [
            (0, 0.0, 0.0, 10.0, 10.0),
            (1, 10.0, 0.0, 20.0, 10.0),
            (2, 0.0, 10.0, 10.0, 20.0),
            (3, 10.0, 10.0, 20.0, 20.0),
        ];
        for (id, x0, y0, x1, y1) in boxes {
            arena.insert(Cell::new(id, Aabb::from_coords(x0, y0, 0.0, x1, y1, 0.0), MovementFlags::WALK, 0));
        }
        let params = ConnectParams { tolerance: 0.0, max_step_height: 1.0 };
        for (a, b) in [(0, 1), (0, 2), (1, 3), (2, 3)] {
            arena.connect(a, b, params);
        }
        arena.get_mut(1).unwrap().movement_cost_mult = 10.0;

        let mut rng = StdRng::seed_from_u64(3);
        let result = find_path(
            &arena,
            0,
            Vec3::new(5.0, 5.0, 0.0),
            &DestinationStrategy::new(Vec3::new(15.0, 15.0, 0.0), 0.0),
            &SearchOptions::default(),
            &mut rng,
        );
        assert_eq!(result.nodes, vec![0, 2, 3]);
    }

    #[test]
    fn test_deadline_reports_timeout() {
        let arena = row_arena(&[(0, 0.0, 10.0), (1, 10.0, 20.0)]);
        let mut rng = StdRng::seed_from_u64(1);
        let options = SearchOptions {
            deadline: Some(Instant::now()),
            ..Default::default()
        };
        let result = find_path(
            &arena,
            0,
            Vec3::new(5.0, 5.0, 0.0),
            &DestinationStrategy::new(Vec3::new(15.0, 5.0, 0.0), 0.0),
            &options,
            &mut rng,
        );
        assert!(result.timed_out());
        assert!(result.nodes.is_empty());
    }

    #[test]
    fn test_partial_path_when_disconnected() {
        let arena = row_arena(&[(0, 0.0, 10.0), (1, 10.0, 20.0), (2, 40.0, 50.0)]);
        let strategy = DestinationStrategy::new(Vec3::new(45.0, 5.0, 0.0), 0.0);
        let mut rng = StdRng::seed_from_u64(1);

        let strict = find_path(&arena, 0, Vec3::new(5.0, 5.0, 0.0), &strategy, &SearchOptions::default(), &mut rng);
        assert_eq!(strict.outcome, PathOutcome::NotFound);

        let options = SearchOptions {
            allow_disconnected: true,
            ..Default::default()
        };
        let partial = find_path(&arena, 0, Vec3::new(5.0, 5.0, 0.0), &strategy, &options, &mut rng);
        assert_eq!(partial.outcome, PathOutcome::Partial);
        assert_eq!(partial.nodes, vec![0, 1]);
        assert_eq!(*partial.points.last().unwrap(), Vec3::new(20.0, 5.0, 0.0));
    }

    /// Heuristic keyed on the entry border, to control discovery order.
    struct ScriptedHeuristic;

    impl PathStrategy<Cell> for ScriptedHeuristic {
        fn min_distance(&self, _node: &Cell, from: Vec3) -> f32 {
            match (from.x.round() as i32, from.y < 20.0) {
                (10, true) => 5.0,
                (10, false) => 40.0,
                (20, true) => 100.0,
                (20, false) => 0.0,
                _ => 10.0,
            }
        }

        fn is_destination(&self, _node: &Cell) -> bool {
            false
        }

        fn target_point(&self, _node: &Cell, from: Vec3) -> Vec3 {
            from
        }
    }

    #[test]
    fn test_partial_path_uses_estimate_at_close() {
        // S (tall) -> {A low, B high} -> P (tall). P is first reached through A,
        // then improved through B, whose border is the best partial end.
        let mut arena = CellArena::new();
        let boxes = [
            (0, 0.0, 0.0, 10.0, 40.0),
            (1, 10.0, 0.0, 20.0, 10.0),
            (2, 10.0, 30.0, 20.0, 40.0),
            (3, 20.0, 0.0, 30.0, 40.0),
        ];
        for (id, x0, y0, x1, y1) in boxes {
            arena.insert(Cell::new(id, Aabb::from_coords(x0, y0, 0.0, x1, y1, 0.0), MovementFlags::WALK, 0));
        }
        let params = ConnectParams { tolerance: 0.0, max_step_height: 1.0 };
        for (a, b) in [(0, 1), (0, 2), (1, 3), (2, 3)] {
            assert!(arena.connect(a, b, params));
        }

        let options = SearchOptions {
            allow_disconnected: true,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let result = find_path(&arena, 0, Vec3::new(5.0, 35.0, 0.0), &ScriptedHeuristic, &options, &mut rng);

        assert_eq!(result.outcome, PathOutcome::Partial);
        assert_eq!(result.nodes, vec![0, 2, 3]);
        assert_eq!(*result.points.last().unwrap(), Vec3::new(20.0, 35.0, 0.0));
    }

    #[test]
    fn test_threat_escape_finds_safe_cell() {
        let mut arena = row_arena(&[(0, 0.0, 10.0), (1, 10.0, 20.0), (2, 20.0, 30.0)]);
        arena.get_mut(0).unwrap().threat = 5.0;
        arena.get_mut(1).unwrap().threat = 3.0;

        let mut rng = StdRng::seed_from_u64(1);
        let result = find_path(
            &arena,
            0,
            Vec3::new(5.0, 5.0, 0.0),
            &ThreatEscapeStrategy::new(1.0, Vec::new()),
            &SearchOptions::default(),
            &mut rng,
        );
        assert!(result.is_found());
        assert_eq!(result.nodes.last(), Some(&2));
        assert_eq!(*result.points.last().unwrap(), Vec3::new(25.0, 5.0, 0.0));
    }

    #[test]
    fn test_jitter_is_reproducible() {
        let arena = row_arena(&[(0, 0.0, 10.0), (1, 10.0, 20.0), (2, 20.0, 30.0)]);
        let options = SearchOptions {
            max_jitter: 0.5,
            ..Default::default()
        };
        let strategy = DestinationStrategy::new(Vec3::new(25.0, 5.0, 0.0), 0.0);
        let a = find_path(&arena, 0, Vec3::new(5.0, 5.0, 0.0), &strategy, &options, &mut StdRng::seed_from_u64(9));
        let b = find_path(&arena, 0, Vec3::new(5.0, 5.0, 0.0), &strategy, &options, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
        assert!(a.cost >= 20.0);
    }
}
