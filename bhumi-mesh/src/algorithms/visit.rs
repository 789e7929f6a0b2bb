//! Breadth-first and depth-first graph visiting.

use std::collections::{HashSet, VecDeque};

use super::graph::{CellGraph, GraphNode, MutableCellGraph, passable_peer};
use crate::flags::MovementFlags;

/// Restrictions applied while visiting.
#[derive(Clone, Debug, Default)]
pub struct VisitOptions<'a> {
    /// Movement flags nodes and edges must carry
    pub flags: MovementFlags,
    /// Stop expanding beyond this many hops
    pub max_depth: Option<usize>,
    /// Only nodes in this set are visited (the start always is)
    pub allowed: Option<&'a HashSet<u32>>,
}

impl VisitOptions<'_> {
    pub fn with_flags(flags: MovementFlags) -> Self {
        Self {
            flags,
            max_depth: None,
            allowed: None,
        }
    }
}

/// One visited node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Visited {
    pub id: u32,
    /// Hops from the start
    pub depth: usize,
    /// Accumulated centre-to-centre distance along the visiting tree
    pub distance: f32,
}

/// Visit reachable nodes in breadth-first order, start included.
///
/// Neighbours are expanded in edge order, so the result is deterministic for
/// a given graph.
pub fn visit_breadth_first<G: CellGraph>(graph: &G, start: u32, options: &VisitOptions<'_>) -> Vec<Visited> {
    let mut order = Vec::new();
    if graph.node(start).is_none() {
        return order;
    }

    let mut seen: HashSet<u32> = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start);
    queue.push_back(Visited {
        id: start,
        depth: 0,
        distance: 0.0,
    });

    while let Some(current) = queue.pop_front() {
        order.push(current);
        if options.max_depth.is_some_and(|max| current.depth >= max) {
            continue;
        }
        let Some(node) = graph.node(current.id) else {
            continue;
        };

        for edge in node.edges() {
            if seen.contains(&edge.cell_id) {
                continue;
            }
            if options.allowed.is_some_and(|set| !set.contains(&edge.cell_id)) {
                continue;
            }
            if passable_peer(graph, edge, options.flags).is_none() {
                continue;
            }
            seen.insert(edge.cell_id);
            queue.push_back(Visited {
                id: edge.cell_id,
                depth: current.depth + 1,
                distance: current.distance + edge.distance,
            });
        }
    }

    order
}

/// Depth-first visit that removes stale edges on the way.
///
/// An edge is stale when its cached distance differs from the current centre
/// distance of its endpoints by more than `tolerance`. Returns the visit order
/// and the number of pruned edges.
pub fn visit_depth_first_pruning<G: MutableCellGraph>(
    graph: &mut G,
    start: u32,
    flags: MovementFlags,
    tolerance: f32,
) -> (Vec<u32>, usize) {
    let mut order = Vec::new();
    let mut pruned = 0;
    if graph.node(start).is_none() {
        return (order, pruned);
    }

    let mut seen: HashSet<u32> = HashSet::new();
    let mut stack = vec![start];

    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        order.push(current);

        let Some(node) = graph.node(current) else {
            continue;
        };
        let center = node.center();

        let mut stale = Vec::new();
        let mut next = Vec::new();
        for edge in node.edges() {
            let Some(peer) = graph.node(edge.cell_id) else {
                stale.push(edge.cell_id);
                continue;
            };
            if (peer.center().distance(center) - edge.distance).abs() > tolerance {
                stale.push(edge.cell_id);
                continue;
            }
            if !seen.contains(&edge.cell_id) && passable_peer(&*graph, edge, flags).is_some() {
                next.push(edge.cell_id);
            }
        }

        for peer in stale {
            if graph.remove_edge(current, peer) {
                pruned += 1;
            }
        }
        // Reverse so the first edge is visited first
        stack.extend(next.into_iter().rev());
    }

    if pruned > 0 {
        tracing::debug!("Pruned {} stale edges starting from {}", pruned, start);
    }
    (order, pruned)
}
