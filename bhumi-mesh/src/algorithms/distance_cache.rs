//! Incremental all-pairs shortest distances, grouped into islands.
//!
//! An island is a connected component of the cached graph. Distances are only
//! kept between nodes of the same island. Joining two islands with a new edge
//! only computes the cross pairs, because the new edge is the single bridge
//! between them.

use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::cmp::Ordering;

/// Pairwise distance cache.
#[derive(Clone, Debug, Default)]
pub struct DistanceCache {
    adjacency: BTreeMap<u32, BTreeMap<u32, f32>>,
    island_of: HashMap<u32, u32>,
    islands: BTreeMap<u32, BTreeSet<u32>>,
    distances: HashMap<(u32, u32), f32>,
    next_island: u32,
}

#[inline]
fn key(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}

impl DistanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.adjacency.contains_key(&id)
    }

    #[inline]
    pub fn nodes_count(&self) -> usize {
        self.adjacency.len()
    }

    #[inline]
    pub fn islands_count(&self) -> usize {
        self.islands.len()
    }

    /// Island id of a node.
    pub fn island(&self, id: u32) -> Option<u32> {
        self.island_of.get(&id).copied()
    }

    /// Shortest cached distance, `None` across islands.
    pub fn distance(&self, a: u32, b: u32) -> Option<f32> {
        if a == b {
            return self.contains(a).then_some(0.0);
        }
        self.distances.get(&key(a, b)).copied()
    }

    /// Add an isolated node. No-op when already present.
    pub fn add_node(&mut self, id: u32) {
        if self.contains(id) {
            return;
        }
        self.adjacency.insert(id, BTreeMap::new());
        let island = self.next_island;
        self.next_island += 1;
        self.islands.insert(island, BTreeSet::from([id]));
        self.island_of.insert(id, island);
    }

    /// Add (or shorten) an undirected edge, adding missing endpoints.
    pub fn add_edge(&mut self, a: u32, b: u32, weight: f32) {
        if a == b {
            return;
        }
        self.add_node(a);
        self.add_node(b);

        let current = self.adjacency.get(&a).and_then(|m| m.get(&b)).copied();
        if current.is_some_and(|w| w <= weight) {
            return;
        }
        if let Some(m) = self.adjacency.get_mut(&a) {
            m.insert(b, weight);
        }
        if let Some(m) = self.adjacency.get_mut(&b) {
            m.insert(a, weight);
        }

        let (Some(ia), Some(ib)) = (self.island(a), self.island(b)) else {
            return;
        };
        if ia == ib {
            self.relax(ia, a, b, weight);
        } else {
            self.merge(ia, ib, a, b, weight);
        }
    }

    /// Remove a node with its edges; its island is recomputed.
    pub fn remove_node(&mut self, id: u32) {
        let Some(peers) = self.adjacency.remove(&id) else {
            return;
        };
        for peer in peers.keys() {
            if let Some(m) = self.adjacency.get_mut(peer) {
                m.remove(&id);
            }
        }

        let Some(island) = self.island_of.remove(&id) else {
            return;
        };
        let members = self.islands.remove(&island).unwrap_or_default();
        for &m in &members {
            self.distances.remove(&key(m, id));
            for &n in &members {
                if m < n {
                    self.distances.remove(&(m, n));
                }
            }
        }

        let remaining: Vec<u32> = members.into_iter().filter(|&m| m != id).collect();
        self.rebuild(&remaining);
    }

    fn relax(&mut self, island: u32, a: u32, b: u32, weight: f32) {
        let Some(members) = self.islands.get(&island) else {
            return;
        };
        let members: Vec<u32> = members.iter().copied().collect();

        let da: Vec<f32> = members.iter().map(|&m| self.distance(m, a).unwrap_or(f32::INFINITY)).collect();
        let db: Vec<f32> = members.iter().map(|&m| self.distance(m, b).unwrap_or(f32::INFINITY)).collect();

        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let via = (da[i] + weight + db[j]).min(db[i] + weight + da[j]);
                let k = key(members[i], members[j]);
                let entry = self.distances.entry(k).or_insert(f32::INFINITY);
                if via < *entry {
                    *entry = via;
                }
            }
        }
    }

    fn merge(&mut self, ia: u32, ib: u32, a: u32, b: u32, weight: f32) {
        let members_a = self.islands.remove(&ia).unwrap_or_default();
        let members_b = self.islands.remove(&ib).unwrap_or_default();

        for &x in &members_a {
            let dxa = self.distance(x, a).unwrap_or(f32::INFINITY);
            for &y in &members_b {
                let dby = self.distance(b, y).unwrap_or(f32::INFINITY);
                self.distances.insert(key(x, y), dxa + weight + dby);
            }
        }

        let mut merged = members_a;
        merged.extend(members_b);
        for &m in &merged {
            self.island_of.insert(m, ia);
        }
        self.islands.insert(ia, merged);
    }

    /// Recompute islands and distances for a node subset from the adjacency.
    fn rebuild(&mut self, nodes: &[u32]) {
        let mut unassigned: BTreeSet<u32> = nodes.iter().copied().collect();

        while let Some(&seed) = unassigned.iter().next() {
            let dist = self.dijkstra(seed);
            let component: BTreeSet<u32> = dist.keys().copied().collect();
            for &m in &component {
                unassigned.remove(&m);
            }

            for &x in &component {
                let from_x = if x == seed { dist.clone() } else { self.dijkstra(x) };
                for (&y, &d) in &from_x {
                    if x < y {
                        self.distances.insert((x, y), d);
                    }
                }
            }

            let island = self.next_island;
            self.next_island += 1;
            for &m in &component {
                self.island_of.insert(m, island);
            }
            self.islands.insert(island, component);
        }
    }

    fn dijkstra(&self, source: u32) -> HashMap<u32, f32> {
        let mut dist: HashMap<u32, f32> = HashMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(source, 0.0);
        heap.push(HeapEntry { d: 0.0, id: source });

        while let Some(HeapEntry { d, id }) = heap.pop() {
            if dist.get(&id).is_some_and(|&best| d > best) {
                continue;
            }
            let Some(edges) = self.adjacency.get(&id) else {
                continue;
            };
            for (&peer, &w) in edges {
                let nd = d + w;
                if dist.get(&peer).is_none_or(|&best| nd < best) {
                    dist.insert(peer, nd);
                    heap.push(HeapEntry { d: nd, id: peer });
                }
            }
        }
        dist
    }
}

#[derive(Clone, Copy, PartialEq)]
struct HeapEntry {
    d: f32,
    id: u32,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.d.total_cmp(&self.d).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
