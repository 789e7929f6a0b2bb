//! Navmesh: owner of the cell graph, region overlay and patches.
//!
//! State is split into groups, each behind its own lock:
//!
//! - `data`: cell arena, grid cells, id generator, dirty flags
//! - `regions`: requested regions and overlay bookkeeping
//! - `patches`: current connectivity patches and their version
//!
//! Locks are always taken in that order. Engines built on top of the navmesh
//! take navmesh locks before their own.

mod observer;
mod overlay;
mod raycast;

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use rand::Rng;

use crate::algorithms::astar::{self, DestinationStrategy, PathOutcome, PathStrategy, SearchOptions, SearchResult};
use crate::algorithms::visit::visit_depth_first_pruning;
use crate::arena::CellArena;
use crate::cell::Cell;
use crate::config::NavmeshConfig;
use crate::error::Result;
use crate::flags::MovementFlags;
use crate::geometry::{Aabb, Vec3};
use crate::grid_cell::{GridCell, GridCellData};
use crate::ids::{CellId, GridCellId, IdGenerator};
use crate::patch::{CellsPatch, build_patches};
use crate::region::Region;
use crate::worker::WorkerLoop;

pub use observer::NavmeshObserver;
pub use overlay::OverlayStats;
pub(crate) use overlay::{OverlayEntry, RegionState};
pub use raycast::RayCastResult;

/// Graph data guarded by the `data` lock.
#[derive(Clone, Debug, Default)]
pub(crate) struct NavmeshData {
    pub(crate) arena: CellArena,
    pub(crate) grid_cells: BTreeMap<GridCellId, GridCell>,
    pub(crate) ids: IdGenerator,
    /// Base cells added since the last overlay pass
    pub(crate) added_cells: Vec<CellId>,
    pub(crate) patches_dirty: bool,
}

/// Patches guarded by the `patches` lock.
#[derive(Clone, Debug, Default)]
pub(crate) struct PatchState {
    pub(crate) patches: Vec<CellsPatch>,
    pub(crate) version: u64,
}

/// Summary of one [`Navmesh::update`] tick.
#[derive(Clone, Debug, Default)]
pub struct UpdateStats {
    pub overlay: OverlayStats,
    pub patches_rebuilt: bool,
    pub patches_count: usize,
}

/// Cell graph with region overlay and connectivity patches.
pub struct Navmesh {
    config: NavmeshConfig,
    pub(crate) data: RwLock<NavmeshData>,
    pub(crate) regions: RwLock<RegionState>,
    pub(crate) patches: RwLock<PatchState>,
    observers: RwLock<Vec<Arc<dyn NavmeshObserver>>>,
    worker: Mutex<Option<WorkerLoop>>,
}

impl Default for Navmesh {
    fn default() -> Self {
        Self::new(NavmeshConfig::default())
    }
}

impl Navmesh {
    pub fn new(config: NavmeshConfig) -> Self {
        Self {
            config,
            data: RwLock::new(NavmeshData::default()),
            regions: RwLock::new(RegionState::default()),
            patches: RwLock::new(PatchState::default()),
            observers: RwLock::new(Vec::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &NavmeshConfig {
        &self.config
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert a grid cell with its base cells.
    ///
    /// When a grid cell with an identical box exists the cells are merged into
    /// it. Otherwise the new grid cell is connected to every overlapping grid
    /// cell. Returns the id of the grid cell that received the cells.
    pub fn add(&self, input: GridCellData, notify: bool) -> GridCellId {
        let params = self.config.connect_params();
        let aabb = input.aabb;

        let grid_id = {
            let mut guard = self.data.write();
            let data = &mut *guard;

            let existing = data
                .grid_cells
                .values()
                .find(|g| *g.aabb() == aabb)
                .map(|g| g.id());

            let mut grid = match existing.and_then(|id| data.grid_cells.remove(&id)) {
                Some(grid) => grid,
                None => {
                    let id = match input.id {
                        Some(id) if !data.grid_cells.contains_key(&id) => {
                            data.ids.reserve_grid_cell(id);
                            id
                        }
                        Some(id) => {
                            tracing::warn!("Grid cell id {} already in use, generating a new one", id);
                            data.ids.next_grid_cell()
                        }
                        None => data.ids.next_grid_cell(),
                    };
                    GridCell::new(id, aabb)
                }
            };

            for cell in &input.cells {
                let mut new_cell = Cell::new(data.ids.next_cell(), cell.aabb, cell.flags, grid.id());
                new_cell.movement_cost_mult = cell.movement_cost_mult;
                let id = grid.add(&mut data.arena, new_cell, params);
                data.added_cells.push(id);
            }

            for other in data.grid_cells.values_mut() {
                if other.aabb().intersects_2d(&aabb, params.tolerance)
                    && other.aabb().vertical_gap(&aabb) <= params.max_step_height
                {
                    grid.add_neighbour(other, &mut data.arena, params);
                }
            }

            let id = grid.id();
            data.grid_cells.insert(id, grid);
            data.patches_dirty = true;
            tracing::debug!("Added grid cell {} with {} cells", id, input.cells.len());
            id
        };

        self.notify(|o| o.on_grid_cell_added(grid_id, &aabb));
        if notify {
            self.notify(|o| o.on_nav_data_changed(&aabb));
        }
        grid_id
    }

    /// Replace the active regions. Applied by the next [`Navmesh::update`].
    pub fn set_regions(&self, regions: Vec<Region>) {
        let mut state = self.regions.write();
        state.requested = regions;
        state.dirty = true;
    }

    /// Active regions.
    pub fn regions(&self) -> Vec<Region> {
        self.regions.read().requested.clone()
    }

    /// One background tick: region overlay, then patch rebuild when needed.
    pub fn update(&self) -> UpdateStats {
        let data = self.data.upgradable_read();
        let regions_dirty = self.regions.read().dirty;
        if !regions_dirty && !data.patches_dirty && data.added_cells.is_empty() {
            return UpdateStats {
                patches_count: self.patches.read().patches.len(),
                ..Default::default()
            };
        }

        let mut data = RwLockUpgradableReadGuard::upgrade(data);
        let mut regions = self.regions.write();
        let overlay = overlay::apply(&mut data, &mut regions, &self.config);
        drop(regions);

        let mut stats = UpdateStats::default();
        if overlay.needs_patch_rebuild() || data.patches_dirty {
            let flags = self.config.patch_flags();
            let inner = &mut *data;
            let patches = build_patches(&inner.arena, &inner.grid_cells, flags, &mut inner.ids);
            inner.patches_dirty = false;

            let mut state = self.patches.write();
            state.patches = patches;
            state.version += 1;
            stats.patches_rebuilt = true;
            tracing::debug!("Rebuilt {} patches (version {})", state.patches.len(), state.version);
        }
        stats.patches_count = self.patches.read().patches.len();
        drop(data);

        for aabb in &overlay.changed {
            self.notify(|o| o.on_nav_data_changed(aabb));
        }
        stats.overlay = overlay;
        stats
    }

    /// Remove every cell, grid cell, region and patch.
    pub fn clear(&self) {
        {
            let mut data = self.data.write();
            let mut regions = self.regions.write();
            let mut patches = self.patches.write();
            *data = NavmeshData::default();
            *regions = RegionState::default();
            patches.patches.clear();
            patches.version += 1;
        }
        tracing::info!("Navmesh cleared");
        self.notify(|o| o.on_navmesh_cleared());
    }

    /// Remove edges whose cached length no longer matches their endpoints,
    /// visiting depth first from `start`. Returns the number of pruned edges.
    pub fn prune_stale_edges(&self, start: CellId, tolerance: f32) -> usize {
        let mut data = self.data.write();
        let (_, pruned) = visit_depth_first_pruning(&mut data.arena, start, MovementFlags::NONE, tolerance);
        if pruned > 0 {
            data.patches_dirty = true;
        }
        pruned
    }

    // ========================================================================
    // Observers and background loop
    // ========================================================================

    pub fn add_observer(&self, observer: Arc<dyn NavmeshObserver>) {
        self.observers.write().push(observer);
    }

    fn notify(&self, f: impl Fn(&dyn NavmeshObserver)) {
        let observers = self.observers.read().clone();
        for observer in &observers {
            f(observer.as_ref());
        }
    }

    /// Run [`Navmesh::update`] on a background thread every `interval`.
    pub fn start_updates(self: &Arc<Self>, interval: Duration) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| w.is_running()) {
            return Ok(());
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        *worker = Some(WorkerLoop::spawn("navmesh", interval, move || {
            if let Some(navmesh) = weak.upgrade() {
                navmesh.update();
            }
            Ok::<(), String>(())
        })?);
        Ok(())
    }

    /// Stop the background loop. Returns `false` if it had to be detached.
    pub fn stop_updates(&self, timeout: Duration) -> bool {
        match self.worker.lock().take() {
            Some(worker) => worker.stop(timeout),
            None => true,
        }
    }

    /// Announce a wholesale state replacement: cleared, then every grid cell.
    pub(crate) fn notify_restored(&self, grid_cells: &[(GridCellId, Aabb)]) {
        self.notify(|o| o.on_navmesh_cleared());
        for (id, aabb) in grid_cells {
            self.notify(|o| o.on_grid_cell_added(*id, aabb));
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Find two points in the same patch.
    ///
    /// Returns both positions snapped onto their nearest qualifying cells when
    /// a patch has cells within `tol_a` of `a` and within `tol_b` of `b`.
    pub fn are_connected(
        &self,
        a: Vec3,
        b: Vec3,
        flags: MovementFlags,
        tol_a: f32,
        tol_b: f32,
    ) -> Option<(Vec3, Vec3)> {
        let state = self.patches.read();
        for patch in state.patches.iter().filter(|p| p.flags().contains(flags)) {
            let Some((_, pa)) = patch.nearest(a, tol_a, flags) else {
                continue;
            };
            if let Some((_, pb)) = patch.nearest(b, tol_b, flags) {
                return Some((pa, pb));
            }
        }
        None
    }

    /// Id of the patch holding `cell`.
    pub fn patch_of(&self, cell: CellId) -> Option<u32> {
        self.patches
            .read()
            .patches
            .iter()
            .find(|p| p.contains_cell(cell))
            .map(|p| p.id())
    }

    /// Ray test along the segment in 3D.
    pub fn ray_cast(&self, origin: Vec3, end: Vec3, flags: MovementFlags) -> RayCastResult {
        self.ray_cast_impl(origin, end, flags, true)
    }

    /// Ray test along the segment's top-down projection.
    pub fn ray_cast_2d(&self, origin: Vec3, end: Vec3, flags: MovementFlags) -> RayCastResult {
        self.ray_cast_impl(origin, end, flags, false)
    }

    fn ray_cast_impl(&self, origin: Vec3, end: Vec3, flags: MovementFlags, use_z: bool) -> RayCastResult {
        let data = self.data.read();

        // Probe half a step along the ray so an origin on a shared boundary
        // starts in the cell the ray enters.
        let dir = if use_z { end - origin } else { (end - origin).with_z(0.0) };
        let length = dir.length();
        let probe = if length > f32::EPSILON {
            origin + dir.normalized() * (length * 0.5).min(self.config.border_tolerance * 0.5)
        } else {
            origin
        };

        let start = locate(&data, probe, flags, 0.0, use_z)
            .or_else(|| locate(&data, origin, flags, self.config.nearest_tolerance, use_z));
        match start {
            Some(start) => raycast::march(&data.arena, start, origin, end, flags, use_z),
            None => RayCastResult { clear: false, end: origin },
        }
    }

    /// Enabled cell carrying `flags` that contains the point, or the nearest
    /// one within `nearest_tolerance`. Ties go to the lower id.
    pub fn get_cell_at(&self, p: Vec3, flags: MovementFlags, nearest_tolerance: f32) -> Option<CellId> {
        locate(&self.data.read(), p, flags, nearest_tolerance, true)
    }

    /// Top-down variant of [`Navmesh::get_cell_at`].
    pub fn get_cell_at_2d(&self, p: Vec3, flags: MovementFlags, nearest_tolerance: f32) -> Option<CellId> {
        locate(&self.data.read(), p, flags, nearest_tolerance, false)
    }

    /// Enabled cells carrying `flags` within `radius` of the point.
    pub fn get_cells_within(&self, p: Vec3, radius: f32, flags: MovementFlags) -> Vec<CellId> {
        let data = self.data.read();
        let mut found: Vec<CellId> = candidates(&data, &Aabb::from_center(p, Vec3::new(radius, radius, 0.0)))
            .filter(|c| c.is_enabled() && c.has_flags(flags) && c.aabb.distance(p) <= radius)
            .map(|c| c.id)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Enabled cells carrying `flags` overlapping the box.
    pub fn get_cells_in_box(&self, aabb: &Aabb, flags: MovementFlags) -> Vec<CellId> {
        let data = self.data.read();
        let mut found: Vec<CellId> = candidates(&data, aabb)
            .filter(|c| c.is_enabled() && c.has_flags(flags) && c.aabb.intersects_2d(aabb, 0.0))
            .map(|c| c.id)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// A* from the cell under `from` to within `precision` of `to`.
    pub fn find_path<R: Rng + ?Sized>(
        &self,
        from: Vec3,
        to: Vec3,
        precision: f32,
        options: &SearchOptions,
        rng: &mut R,
    ) -> SearchResult {
        self.find_path_with(from, &DestinationStrategy::new(to, precision), options, rng)
    }

    /// A* from the cell under `from` with a custom goal strategy.
    pub fn find_path_with<S, R>(&self, from: Vec3, strategy: &S, options: &SearchOptions, rng: &mut R) -> SearchResult
    where
        S: PathStrategy<Cell>,
        R: Rng + ?Sized,
    {
        let data = self.data.read();
        let Some(start) = locate(&data, from, options.flags, self.config.nearest_tolerance, true) else {
            return SearchResult {
                outcome: PathOutcome::NotFound,
                nodes: Vec::new(),
                points: Vec::new(),
                cost: 0.0,
                expanded: 0,
            };
        };
        astar::find_path(&data.arena, start, from, strategy, options, rng)
    }

    /// Run `f` with the cell graph under a read lock.
    pub fn with_graph<T>(&self, f: impl FnOnce(&CellArena) -> T) -> T {
        f(&self.data.read().arena)
    }

    /// Like [`Navmesh::with_graph`], but `None` when a writer holds the lock.
    pub fn try_with_graph<T>(&self, f: impl FnOnce(&CellArena) -> T) -> Option<T> {
        self.data.try_read().map(|data| f(&data.arena))
    }

    /// Cloned snapshot of a cell.
    pub fn cell(&self, id: CellId) -> Option<Cell> {
        self.data.read().arena.get(id).cloned()
    }

    /// Cloned snapshot of a grid cell.
    pub fn grid_cell(&self, id: GridCellId) -> Option<GridCell> {
        self.data.read().grid_cells.get(&id).cloned()
    }

    /// Ids of all grid cells in ascending order.
    pub fn grid_cell_ids(&self) -> Vec<GridCellId> {
        self.data.read().grid_cells.keys().copied().collect()
    }

    pub fn grid_cells_count(&self) -> usize {
        self.data.read().grid_cells.len()
    }

    /// All cells, including disabled originals and replacements.
    pub fn cells_count(&self) -> usize {
        self.data.read().arena.len()
    }

    /// Base (non-replacement) cells.
    pub fn base_cells_count(&self) -> usize {
        self.data.read().arena.iter().filter(|c| !c.is_replacement()).count()
    }

    /// Cloned snapshot of the current patches.
    pub fn patches(&self) -> Vec<CellsPatch> {
        self.patches.read().patches.clone()
    }

    pub fn patches_count(&self) -> usize {
        self.patches.read().patches.len()
    }

    /// Incremented every time the patches are rebuilt.
    pub fn patches_version(&self) -> u64 {
        self.patches.read().version
    }

    /// Whether every edge has its mirror.
    pub fn is_symmetric(&self) -> bool {
        self.data.read().arena.is_symmetric()
    }
}

/// Cells of the grid buckets overlapping `area` (top-down).
fn candidates<'a>(data: &'a NavmeshData, area: &'a Aabb) -> impl Iterator<Item = &'a Cell> + 'a {
    data.grid_cells
        .values()
        .filter(move |g| g.aabb().intersects_2d(area, 0.0))
        .flat_map(|g| g.all_cells())
        .filter_map(|id| data.arena.get(id))
}

fn locate(data: &NavmeshData, p: Vec3, flags: MovementFlags, tolerance: f32, use_z: bool) -> Option<CellId> {
    let area = Aabb::from_center(p, Vec3::new(tolerance, tolerance, 0.0));
    let mut best: Option<(f32, CellId)> = None;
    for cell in candidates(data, &area) {
        if !cell.is_enabled() || !cell.has_flags(flags) {
            continue;
        }
        let d = if use_z { cell.aabb.distance(p) } else { cell.aabb.distance_2d(p) };
        if d > tolerance {
            continue;
        }
        let better = match best {
            None => true,
            Some((bd, bid)) => d < bd || (d == bd && cell.id < bid),
        };
        if better {
            best = Some((d, cell.id));
        }
    }
    best.map(|(_, id)| id)
}
