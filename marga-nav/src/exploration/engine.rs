//! Exploration engine: frontier tiling, explored tracking and target selection.
//!
//! The engine listens to navmesh grid-cell notifications through a channel and
//! processes them on its own loop.
//!
//! Locks: `selection` serialises ticks and may be held across navmesh calls.
//! `state` and then `hooks` are only taken after navmesh queries returned.
//! Observers are called with neither of them held.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bhumi_mesh::algorithms::{
    AnnealingParams, DistanceCache, PathOutcome, VisitOptions, order_simulated_annealing, order_two_opt,
    visit_breadth_first,
};
use bhumi_mesh::{Aabb, GridCellId, MovementFlags, Navmesh, NavmeshObserver, PatchId, Vec3, WorkerLoop};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::ExploreStrategy;
use super::explore_cell::{ExploreCell, ExploreCellId, ExploreMap};
use super::tiling::{Tile, build_tile, squares_overlapping};
use crate::config::{ExplorationConfig, MargaConfig};
use crate::error::Result;
use crate::navigation::{DestType, Destination, NavigationEngine};

/// Receives frontier changes.
///
/// Called on the exploration thread after the engine released its locks.
pub trait ExploreObserver: Send + Sync {
    fn on_explore_cell_added(&self, _cell: &ExploreCell) {}

    fn on_explore_cell_removed(&self, _id: ExploreCellId) {}

    fn on_explore_cell_explored(&self, _id: ExploreCellId) {}
}

/// Navmesh change forwarded to the exploration loop.
#[derive(Clone, Copy, Debug)]
enum MeshEvent {
    GridCellAdded(GridCellId, Aabb),
    Cleared,
}

struct MeshForwarder {
    tx: Sender<MeshEvent>,
}

impl NavmeshObserver for MeshForwarder {
    fn on_grid_cell_added(&self, id: GridCellId, aabb: &Aabb) {
        // Receiver gone means the engine was dropped
        let _ = self.tx.send(MeshEvent::GridCellAdded(id, *aabb));
    }

    fn on_navmesh_cleared(&self) {
        let _ = self.tx.send(MeshEvent::Cleared);
    }
}

type CellPredicate = Box<dyn Fn(&ExploreCell) -> bool + Send + Sync>;

/// Caller-supplied restrictions.
#[derive(Default)]
struct Hooks {
    /// Extra "small" criterion
    small: Option<CellPredicate>,
    /// Every filter must accept a candidate
    filters: Vec<CellPredicate>,
    /// Candidates must have their centre inside
    bounds: Option<Aabb>,
}

/// Frontier graph guarded by the `state` lock.
#[derive(Clone, Debug, Default)]
pub(crate) struct ExploreState {
    pub(crate) map: ExploreMap,
    pub(crate) cache: DistanceCache,
    pub(crate) next_id: ExploreCellId,
    pub(crate) patches_version_seen: u64,
    pub(crate) membership_dirty: bool,
}

impl ExploreState {
    /// Rebuild the distance cache from the frontier graph.
    pub(crate) fn rebuild_cache(&mut self) {
        let mut cache = DistanceCache::new();
        for cell in self.map.iter() {
            cache.add_node(cell.id);
        }
        for cell in self.map.iter() {
            for n in cell.neighbours().iter().filter(|n| n.cell_id > cell.id) {
                cache.add_edge(cell.id, n.cell_id, n.distance);
            }
        }
        self.cache = cache;
    }
}

/// Current target, guarded by the `selection` lock.
/// Outcome of re-checking the current target.
enum TargetCheck {
    Keep,
    /// No longer pursued or already explored
    Drop,
    /// Judged unreachable by a fresh search
    Unreachable,
}

struct Selection {
    target: Option<ExploreCellId>,
    /// When the target was last handed to navigation
    selected_at: Option<Instant>,
    /// Search already judged for the current target
    verdict_seen: Option<Instant>,
    timeouts: u32,
    finished_logged: bool,
    rng: StdRng,
}

/// Tiles discovered terrain and drives exploration destinations.
pub struct ExplorationEngine {
    config: ExplorationConfig,
    position_tolerance: f32,
    navmesh: Arc<Navmesh>,
    navigation: Arc<NavigationEngine>,
    events: Receiver<MeshEvent>,
    selection: Mutex<Selection>,
    pub(crate) state: RwLock<ExploreState>,
    hooks: RwLock<Hooks>,
    observers: RwLock<Vec<Arc<dyn ExploreObserver>>>,
    worker: Mutex<Option<WorkerLoop>>,
}

impl ExplorationEngine {
    /// Subscribe to the navmesh; grid cells already present are queued.
    pub fn new(config: &MargaConfig, navmesh: Arc<Navmesh>, navigation: Arc<NavigationEngine>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        navmesh.add_observer(Arc::new(MeshForwarder { tx: tx.clone() }));

        let existing = navmesh.grid_cell_ids();
        for id in &existing {
            if let Some(grid) = navmesh.grid_cell(*id) {
                let _ = tx.send(MeshEvent::GridCellAdded(*id, *grid.aabb()));
            }
        }
        tracing::info!(
            "Exploration engine created (cell size {:.1}, {} grid cells queued)",
            config.exploration.explore_cell_size,
            existing.len()
        );

        Self {
            selection: Mutex::new(Selection {
                target: None,
                selected_at: None,
                verdict_seen: None,
                timeouts: 0,
                finished_logged: false,
                rng: StdRng::seed_from_u64(config.exploration.rng_seed),
            }),
            config: config.exploration.clone(),
            position_tolerance: config.navigation.position_tolerance,
            navmesh,
            navigation,
            events: rx,
            state: RwLock::new(ExploreState::default()),
            hooks: RwLock::new(Hooks::default()),
            observers: RwLock::new(Vec::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ExplorationConfig {
        &self.config
    }

    // ========================================================================
    // Hooks and observers
    // ========================================================================

    pub fn add_observer(&self, observer: Arc<dyn ExploreObserver>) {
        self.observers.write().push(observer);
    }

    fn notify(&self, f: impl Fn(&dyn ExploreObserver)) {
        let observers = self.observers.read().clone();
        for observer in &observers {
            f(observer.as_ref());
        }
    }

    /// Extra criterion flagging newly tiled cells as small.
    pub fn set_small_predicate(&self, predicate: impl Fn(&ExploreCell) -> bool + Send + Sync + 'static) {
        self.hooks.write().small = Some(Box::new(predicate));
    }

    /// Candidates must pass every filter.
    pub fn add_filter(&self, filter: impl Fn(&ExploreCell) -> bool + Send + Sync + 'static) {
        self.hooks.write().filters.push(Box::new(filter));
    }

    pub fn clear_filters(&self) {
        self.hooks.write().filters.clear();
    }

    /// Restrict candidates to cells centred inside `bounds`.
    pub fn set_bounds(&self, bounds: Option<Aabb>) {
        self.hooks.write().bounds = bounds;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn explore_cells_count(&self) -> usize {
        self.state.read().map.len()
    }

    pub fn explore_cell(&self, id: ExploreCellId) -> Option<ExploreCell> {
        self.state.read().map.get(id).cloned()
    }

    pub fn explore_cells(&self) -> Vec<ExploreCell> {
        self.state.read().map.iter().cloned().collect()
    }

    /// Frontier cell under the point, or the nearest within the position tolerance.
    pub fn explore_cell_at(&self, p: Vec3) -> Option<ExploreCellId> {
        self.state.read().map.cell_at(p, self.position_tolerance)
    }

    /// Explored share of non-small frontier cells, in percent.
    pub fn get_global_explored_percent(&self) -> f32 {
        let state = self.state.read();
        let (total, explored) = state
            .map
            .iter()
            .filter(|c| !c.small)
            .fold((0usize, 0usize), |(t, e), c| (t + 1, e + usize::from(c.explored)));
        if total == 0 {
            return 100.0;
        }
        explored as f32 / total as f32 * 100.0
    }

    /// Whether every cell that could be a target is explored.
    pub fn is_exploration_finished(&self) -> bool {
        let explore_small = self.config.explore_small;
        self.state
            .read()
            .map
            .iter()
            .filter(|c| explore_small || !c.small)
            .all(|c| c.explored)
    }

    /// Frontier cell currently pushed to navigation.
    pub fn current_target(&self) -> Option<ExploreCellId> {
        self.selection.lock().target
    }

    // ========================================================================
    // Explored marking
    // ========================================================================

    pub fn mark_explored(&self, id: ExploreCellId) -> bool {
        let marked = {
            let mut state = self.state.write();
            match state.map.get_mut(id) {
                Some(cell) if !cell.explored => {
                    cell.explored = true;
                    cell.delayed = false;
                    true
                }
                _ => false,
            }
        };
        if marked {
            self.notify(|o| o.on_explore_cell_explored(id));
        }
        marked
    }

    pub fn mark_all_explored(&self) {
        let marked: Vec<ExploreCellId> = {
            let mut state = self.state.write();
            state
                .map
                .iter_mut()
                .filter(|c| !c.explored)
                .map(|c| {
                    c.explored = true;
                    c.delayed = false;
                    c.id
                })
                .collect()
        };
        tracing::info!("Marked {} frontier cells explored", marked.len());
        for id in marked {
            self.notify(|o| o.on_explore_cell_explored(id));
        }
    }

    /// Mark the cell under `pos` and cells centred within the explore radius.
    fn mark_near(&self, pos: Vec3) {
        let radius = self.config.explore_radius;
        let marked: Vec<ExploreCellId> = {
            let mut state = self.state.write();
            let under = state.map.cell_at(pos, 0.0);
            state
                .map
                .iter_mut()
                .filter(|c| !c.explored && (Some(c.id) == under || c.aabb.center().distance_2d(pos) <= radius))
                .map(|c| {
                    c.explored = true;
                    c.delayed = false;
                    c.id
                })
                .collect()
        };
        for id in marked {
            tracing::debug!("Frontier cell {} explored", id);
            self.notify(|o| o.on_explore_cell_explored(id));
        }
    }

    /// First unreachable report delays a cell, the second marks it explored.
    pub fn report_unreachable(&self, id: ExploreCellId) {
        let forced = {
            let mut state = self.state.write();
            let Some(cell) = state.map.get_mut(id) else {
                return;
            };
            if cell.explored {
                return;
            }
            if cell.delayed {
                cell.explored = true;
                cell.delayed = false;
                true
            } else {
                cell.delayed = true;
                false
            }
        };
        if forced {
            tracing::warn!("Frontier cell {} unreachable twice, marked explored", id);
            self.notify(|o| o.on_explore_cell_explored(id));
        } else {
            tracing::info!("Frontier cell {} unreachable, delayed", id);
        }
    }

    // ========================================================================
    // Tiling
    // ========================================================================

    /// Drain navmesh notifications, re-tile and refresh patch membership.
    pub fn refresh(&self) {
        let mut cleared = false;
        let mut squares = BTreeSet::new();
        for event in self.events.try_iter() {
            match event {
                MeshEvent::GridCellAdded(_, aabb) => {
                    squares.extend(squares_overlapping(&aabb, self.config.explore_cell_size));
                }
                MeshEvent::Cleared => {
                    cleared = true;
                    squares.clear();
                }
            }
        }

        if cleared {
            self.reset();
        }
        if !squares.is_empty() {
            self.retile(&squares);
        }
        self.refresh_membership();
    }

    fn reset(&self) {
        let removed = {
            let mut state = self.state.write();
            let removed = state.map.clear();
            state.cache = DistanceCache::new();
            state.membership_dirty = true;
            removed
        };
        tracing::info!("Navmesh cleared, dropped {} frontier cells", removed.len());
        for id in removed {
            self.notify(|o| o.on_explore_cell_removed(id));
        }
    }

    fn retile(&self, squares: &BTreeSet<(i32, i32)>) {
        let size = self.config.explore_cell_size;
        let tiles: Vec<Tile> = squares
            .iter()
            .filter_map(|sq| build_tile(&self.navmesh, *sq, size))
            .collect();

        let mut removed = Vec::new();
        let mut added = Vec::new();
        {
            let mut state = self.state.write();
            let hooks = self.hooks.read();

            for square in squares {
                let Some(old) = state.map.at_square(*square).and_then(|id| state.map.remove(id)) else {
                    continue;
                };
                state.cache.remove_node(old.id);
                removed.push(old);
            }

            for tile in tiles {
                let id = state.next_id;
                state.next_id += 1;

                // A cell keeps its explored state when the terrain did not grow
                let explored = removed.iter().any(|old| {
                    old.explored && old.aabb.contains_2d(tile.aabb.min) && old.aabb.contains_2d(tile.aabb.max)
                });
                let mut cell = ExploreCell {
                    id,
                    aabb: tile.aabb,
                    square: tile.square,
                    cells: tile.cells,
                    area: tile.area,
                    explored,
                    delayed: false,
                    small: false,
                    patches: Vec::new(),
                    neighbours: Vec::new(),
                    reach: tile.reach,
                };
                cell.small = cell.area < self.config.min_area
                    || cell.aabb.max_dimension_2d() < self.config.min_dimension
                    || hooks.small.as_ref().is_some_and(|f| f(&cell));

                let around = state.map.around(cell.square);
                let peers: Vec<ExploreCellId> = around
                    .into_iter()
                    .filter(|p| state.map.get(*p).is_some_and(|peer| peer.touches(&cell)))
                    .collect();

                state.map.insert(cell);
                state.cache.add_node(id);
                for peer in peers {
                    if let Some(distance) = state.map.connect(id, peer) {
                        state.cache.add_edge(id, peer, distance);
                    }
                }
                added.push(id);
            }
            state.membership_dirty = true;

            tracing::debug!(
                "Re-tiled {} squares: {} frontier cells removed, {} added ({} total)",
                squares.len(),
                removed.len(),
                added.len(),
                state.map.len()
            );
        }

        for old in &removed {
            self.notify(|o| o.on_explore_cell_removed(old.id));
        }
        for id in added {
            if let Some(cell) = self.explore_cell(id) {
                self.notify(|o| o.on_explore_cell_added(&cell));
            }
        }
    }

    /// Recompute patch membership when the navmesh patches changed.
    fn refresh_membership(&self) {
        let version = self.navmesh.patches_version();
        {
            let state = self.state.read();
            if version == state.patches_version_seen && !state.membership_dirty {
                return;
            }
        }

        let patches = self.navmesh.patches();
        let mut state = self.state.write();
        for cell in state.map.iter_mut() {
            let dims = cell.aabb.dimensions();
            // Skip patches that only touch the border; tiny cells shrink by a quarter instead
            let shrink = 0.01_f32.min(dims.x.min(dims.y) * 0.25);
            let probe = cell.aabb.expanded(-shrink, 0.0);
            cell.patches = patches
                .iter()
                .filter(|p| !p.get_cells_within_box(&probe, MovementFlags::WALK).is_empty())
                .map(|p| p.id())
                .collect();
        }
        state.patches_version_seen = version;
        state.membership_dirty = false;
        tracing::debug!("Frontier patch membership refreshed (patch version {})", version);
    }

    // ========================================================================
    // Target selection
    // ========================================================================

    /// Pick the next frontier cell for an agent at `pos`.
    pub fn select_target(&self, pos: Vec3) -> Option<ExploreCellId> {
        let mut selection = self.selection.lock();
        self.select_with(&mut selection, pos)
    }

    fn agent_patch(&self, pos: Vec3) -> Option<PatchId> {
        self.navmesh
            .get_cell_at(pos, MovementFlags::WALK, self.position_tolerance)
            .and_then(|cell| self.navmesh.patch_of(cell))
    }

    fn select_with(&self, selection: &mut Selection, pos: Vec3) -> Option<ExploreCellId> {
        let agent_patch = self.agent_patch(pos);
        let state = self.state.read();
        let hooks = self.hooks.read();

        let start = state.map.cell_at(pos, self.position_tolerance)?;
        let visited = visit_breadth_first(&state.map, start, &VisitOptions::with_flags(MovementFlags::WALK));

        let eligible = |cell: &ExploreCell| {
            !cell.explored
                && (self.config.explore_small || !cell.small)
                && agent_patch.is_none_or(|p| cell.patches.contains(&p))
                && hooks.bounds.is_none_or(|b| b.contains_2d(cell.aabb.center()))
                && hooks.filters.iter().all(|f| f(cell))
        };

        let mut primary = Vec::new();
        let mut delayed = Vec::new();
        for v in &visited {
            let Some(cell) = state.map.get(v.id) else {
                continue;
            };
            if !eligible(cell) {
                continue;
            }
            let distance = state.cache.distance(start, v.id).unwrap_or(v.distance);
            if cell.delayed {
                delayed.push((v.id, distance));
            } else {
                primary.push((v.id, distance));
            }
        }
        // Delayed cells only when nothing else is left
        let pool = if primary.is_empty() { delayed } else { primary };
        if pool.is_empty() {
            return None;
        }

        let ids: Vec<ExploreCellId> = pool.iter().map(|(id, _)| *id).collect();
        match self.config.strategy {
            ExploreStrategy::Nearest => {
                let reward = self.config.neighbour_reward;
                let mut best: Option<(f32, ExploreCellId)> = None;
                for (id, distance) in pool {
                    let score = distance - reward * explored_neighbour_fraction(&state.map, id);
                    let better = match best {
                        None => true,
                        Some((bs, bid)) => score < bs || (score == bs && id < bid),
                    };
                    if better {
                        best = Some((score, id));
                    }
                }
                best.map(|(_, id)| id)
            }
            ExploreStrategy::TwoOpt => {
                let deadline = Instant::now() + Duration::from_millis(self.config.route_time_budget_ms);
                order_two_opt(start, &ids, &state.cache, deadline).first().copied()
            }
            ExploreStrategy::Annealing => {
                order_simulated_annealing(start, &ids, &state.cache, &AnnealingParams::default(), &mut selection.rng)
                    .first()
                    .copied()
            }
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Run one exploration tick.
    pub fn update(&self) -> Result<()> {
        let mut selection = self.selection.lock();
        self.refresh();

        let pos = self.navigation.current_pos();
        self.mark_near(pos);

        // Destinations of higher priority are left alone
        let active = self.navigation.destination();
        if let Some(dest) = active {
            if dest.kind != DestType::Explore && !self.navigation.priorities().allows(dest.kind, DestType::Explore) {
                return Ok(());
            }
        }

        if let Some(target) = selection.target {
            match self.check_target(&mut selection, target, active) {
                TargetCheck::Keep => return Ok(()),
                // Re-evaluated on a later tick, after navigation searched again
                TargetCheck::Unreachable => {
                    selection.target = None;
                    return Ok(());
                }
                TargetCheck::Drop => selection.target = None,
            }
        }

        let Some(target) = self.select_with(&mut selection, pos) else {
            if active.is_some_and(|d| d.kind == DestType::Explore) {
                self.navigation.clear_destination(DestType::Explore);
            }
            if !selection.finished_logged && self.explore_cells_count() > 0 {
                tracing::info!(
                    "No frontier cell left to explore ({:.1}% explored)",
                    self.get_global_explored_percent()
                );
                selection.finished_logged = true;
            }
            return Ok(());
        };
        selection.finished_logged = false;

        let Some(cell) = self.explore_cell(target) else {
            return Ok(());
        };
        let reach = cell.aabb.max_dimension_2d();
        let Some((_, point)) = self
            .navmesh
            .are_connected(pos, cell.aabb.center(), MovementFlags::WALK, self.position_tolerance, reach)
        else {
            self.report_unreachable(target);
            return Ok(());
        };

        let dest =
            Destination::new(DestType::Explore, point, self.config.destination_precision).with_tag(u64::from(target));
        if self.navigation.set_destination(dest) {
            tracing::info!("Exploring frontier cell {} at {}", target, point);
            selection.target = Some(target);
            selection.selected_at = Some(Instant::now());
            selection.verdict_seen = None;
            selection.timeouts = 0;
        }
        Ok(())
    }

    /// Whether the current target is still worth pursuing.
    ///
    /// Only searches computed after the target was (re)selected count as a
    /// verdict, each one at most once.
    fn check_target(
        &self,
        selection: &mut Selection,
        target: ExploreCellId,
        active: Option<Destination>,
    ) -> TargetCheck {
        let tag = Some(u64::from(target));
        let pursued = active.is_some_and(|d| d.kind == DestType::Explore && d.tag == tag);
        let open = self.explore_cell(target).is_some_and(|c| !c.explored);
        if !pursued || !open {
            return TargetCheck::Drop;
        }

        let path = self.navigation.path();
        let Some(computed_at) = path.computed_at else {
            return TargetCheck::Keep;
        };
        let searched = path.destination.is_some_and(|d| d.tag == tag);
        let fresh =
            selection.selected_at.is_none_or(|at| computed_at > at) && selection.verdict_seen != Some(computed_at);
        if !searched || !fresh {
            return TargetCheck::Keep;
        }
        selection.verdict_seen = Some(computed_at);

        match path.outcome {
            Some(PathOutcome::NotFound) => {
                self.report_unreachable(target);
                TargetCheck::Unreachable
            }
            Some(PathOutcome::TimedOut) => {
                selection.timeouts += 1;
                if selection.timeouts < self.config.max_search_timeouts.max(1) {
                    return TargetCheck::Keep;
                }
                tracing::warn!("Search to frontier cell {} timed out {} times", target, selection.timeouts);
                selection.timeouts = 0;
                self.report_unreachable(target);
                TargetCheck::Unreachable
            }
            _ => {
                selection.timeouts = 0;
                TargetCheck::Keep
            }
        }
    }

    // ========================================================================
    // Background loop
    // ========================================================================

    /// Run [`ExplorationEngine::update`] on a background thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| w.is_running()) {
            return Ok(());
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = Duration::from_millis(self.config.update_interval_ms);
        *worker = Some(WorkerLoop::spawn("exploration", interval, move || match weak.upgrade() {
            Some(engine) => engine.update(),
            None => Ok(()),
        })?);
        Ok(())
    }

    /// Stop the background loop. Returns `false` if it had to be detached.
    pub fn stop(&self, timeout: Duration) -> bool {
        match self.worker.lock().take() {
            Some(worker) => worker.stop(timeout),
            None => true,
        }
    }
}

fn explored_neighbour_fraction(map: &ExploreMap, id: ExploreCellId) -> f32 {
    let Some(cell) = map.get(id) else {
        return 0.0;
    };
    let neighbours = cell.neighbours();
    if neighbours.is_empty() {
        return 0.0;
    }
    let explored = neighbours
        .iter()
        .filter(|n| map.get(n.cell_id).is_some_and(|c| c.explored))
        .count();
    explored as f32 / neighbours.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use bhumi_mesh::GridCellData;

    fn setup(size: f32) -> (Arc<Navmesh>, Arc<NavigationEngine>, ExplorationEngine) {
        let mut config = MargaConfig::default();
        config.exploration.explore_cell_size = size;
        let navmesh = Arc::new(Navmesh::default());
        let navigation = Arc::new(NavigationEngine::new(&config, Arc::clone(&navmesh)));
        let exploration = ExplorationEngine::new(&config, Arc::clone(&navmesh), Arc::clone(&navigation));
        (navmesh, navigation, exploration)
    }

    #[test]
    fn test_existing_grid_cells_are_tiled() {
        let mut config = MargaConfig::default();
        config.exploration.explore_cell_size = 10.0;
        let navmesh = Arc::new(Navmesh::default());
        navmesh.add(GridCellData::single(Aabb::from_coords(0.0, 0.0, 0.0, 20.0, 10.0, 0.0)), false);
        let navigation = Arc::new(NavigationEngine::new(&config, Arc::clone(&navmesh)));
        let exploration = ExplorationEngine::new(&config, navmesh, navigation);

        exploration.refresh();
        assert_eq!(exploration.explore_cells_count(), 2);
    }

    #[test]
    fn test_retile_replaces_overlapped_cells() {
        let (navmesh, _nav, exploration) = setup(10.0);
        navmesh.add(GridCellData::single(Aabb::from_coords(0.0, 0.0, 0.0, 5.0, 10.0, 0.0)), true);
        exploration.refresh();
        let first = exploration.explore_cells();
        assert_eq!(first.len(), 1);
        approx::assert_relative_eq!(first[0].area, 50.0);

        // Terrain grows inside the same square
        navmesh.add(GridCellData::single(Aabb::from_coords(5.0, 0.0, 0.0, 10.0, 10.0, 0.0)), true);
        exploration.refresh();
        let second = exploration.explore_cells();
        assert_eq!(second.len(), 1);
        assert_ne!(second[0].id, first[0].id);
        approx::assert_relative_eq!(second[0].area, 100.0);
        assert_eq!(second[0].cells.len(), 2);
    }

    #[test]
    fn test_neighbours_follow_navmesh_adjacency() {
        let (navmesh, _nav, exploration) = setup(10.0);
        // Two rooms side by side, a third one separated by a gap
        navmesh.add(GridCellData::single(Aabb::from_coords(0.0, 0.0, 0.0, 10.0, 10.0, 0.0)), true);
        navmesh.add(GridCellData::single(Aabb::from_coords(10.0, 0.0, 0.0, 20.0, 10.0, 0.0)), true);
        navmesh.add(GridCellData::single(Aabb::from_coords(30.0, 0.0, 0.0, 40.0, 10.0, 0.0)), true);
        exploration.refresh();

        let a = exploration.explore_cell_at(Vec3::new(5.0, 5.0, 0.0)).unwrap();
        let b = exploration.explore_cell_at(Vec3::new(15.0, 5.0, 0.0)).unwrap();
        let c = exploration.explore_cell_at(Vec3::new(35.0, 5.0, 0.0)).unwrap();
        assert!(exploration.explore_cell(a).unwrap().is_neighbour(b));
        assert!(exploration.explore_cell(c).unwrap().neighbours().is_empty());
        assert!(exploration.state.read().map.is_symmetric());
    }

    #[test]
    fn test_small_criteria_are_independent() {
        let mut config = MargaConfig::default();
        config.exploration.explore_cell_size = 10.0;
        config.exploration.min_area = 5.0;
        config.exploration.min_dimension = 3.0;
        let navmesh = Arc::new(Navmesh::default());
        let navigation = Arc::new(NavigationEngine::new(&config, Arc::clone(&navmesh)));
        let exploration = ExplorationEngine::new(&config, Arc::clone(&navmesh), navigation);
        exploration.set_small_predicate(|cell| cell.square == (5, 0));

        // 4 x 1: small by area only
        navmesh.add(GridCellData::single(Aabb::from_coords(0.0, 0.0, 0.0, 4.0, 1.0, 0.0)), true);
        // 10 x 2: neither criterion applies
        navmesh.add(GridCellData::single(Aabb::from_coords(20.0, 0.0, 0.0, 30.0, 2.0, 0.0)), true);
        // 2.5 x 2.5: area 6.25 passes, dimension fails
        navmesh.add(GridCellData::single(Aabb::from_coords(40.0, 0.0, 0.0, 42.5, 2.5, 0.0)), true);
        // Large, flagged by the predicate
        navmesh.add(GridCellData::single(Aabb::from_coords(50.0, 0.0, 0.0, 60.0, 10.0, 0.0)), true);
        exploration.refresh();

        let small = |x: f32| {
            let id = exploration.explore_cell_at(Vec3::new(x, 0.5, 0.0)).unwrap();
            exploration.explore_cell(id).unwrap().small
        };
        assert!(small(1.0));
        assert!(!small(25.0));
        assert!(small(41.0));
        assert!(small(55.0));
    }

    #[test]
    fn test_delayed_then_explored() {
        let (navmesh, _nav, exploration) = setup(10.0);
        navmesh.add(GridCellData::single(Aabb::from_coords(0.0, 0.0, 0.0, 10.0, 10.0, 0.0)), true);
        exploration.refresh();
        let id = exploration.explore_cells()[0].id;

        exploration.report_unreachable(id);
        let cell = exploration.explore_cell(id).unwrap();
        assert!(cell.delayed && !cell.explored);

        exploration.report_unreachable(id);
        let cell = exploration.explore_cell(id).unwrap();
        assert!(cell.explored && !cell.delayed);
    }

    #[test]
    fn test_selection_prefers_finishing_neighbourhoods() {
        let (navmesh, nav, exploration) = setup(10.0);
        // Row of five squares; agent in the middle one
        navmesh.add(GridCellData::single(Aabb::from_coords(0.0, 0.0, 0.0, 50.0, 10.0, 0.0)), true);
        navmesh.update();
        exploration.refresh();
        nav.set_current_pos(Vec3::new(25.0, 5.0, 0.0));

        let at = |x: f32| exploration.explore_cell_at(Vec3::new(x, 5.0, 0.0)).unwrap();
        exploration.mark_explored(at(25.0));
        // Square 0 is explored, so square 1 has every neighbour explored
        exploration.mark_explored(at(5.0));

        assert_eq!(exploration.select_target(Vec3::new(25.0, 5.0, 0.0)), Some(at(15.0)));
    }

    #[test]
    fn test_update_pushes_explore_destination() {
        let (navmesh, nav, exploration) = setup(10.0);
        navmesh.add(GridCellData::single(Aabb::from_coords(0.0, 0.0, 0.0, 30.0, 10.0, 0.0)), true);
        navmesh.update();
        nav.set_current_pos(Vec3::new(5.0, 5.0, 0.0));

        exploration.update().unwrap();
        let dest = nav.destination().unwrap();
        assert_eq!(dest.kind, DestType::Explore);
        let target = exploration.current_target().unwrap();
        assert_eq!(dest.tag, Some(u64::from(target)));
        assert!(!exploration.explore_cell(target).unwrap().explored);

        // A user destination is not overridden
        nav.set_destination(Destination::new(DestType::User, Vec3::new(2.0, 2.0, 0.0), 0.5));
        exploration.update().unwrap();
        assert_eq!(nav.destination().map(|d| d.kind), Some(DestType::User));
    }
}
