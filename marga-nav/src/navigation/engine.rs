//! Navigation engine: destination arbitration, path maintenance and following.
//!
//! State groups, each behind its own lock:
//!
//! - `tick`: anti-stuck tracker, threat memory, jitter generator (held for a whole tick)
//! - `control`: agent position, destinations, waypoints, history
//! - `path`: live path, written only by the tick
//! - `status`: threat and escalation summary for readers
//!
//! Locks are taken in that order. `tick` may be held across navmesh calls;
//! the others are only taken after navmesh queries returned. Host calls take
//! a single lock each.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bhumi_mesh::algorithms::{PathOutcome, SearchOptions, ThreatEscapeStrategy};
use bhumi_mesh::{GridCellId, MovementFlags, Navmesh, Vec3, WorkerLoop};
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::anti_stuck::{AntiStuck, AntiStuckStatus};
use super::destination::{DestType, Destination, Priorities, StopBehavior};
use super::follow::FollowStep;
use super::path::PathData;
use super::threat::{ThreatAhead, ThreatTracker};
use crate::config::{AntiStuckConfig, MargaConfig, NavigationConfig, ThreatConfig};
use crate::error::Result;

/// Destination and history state guarded by the `control` lock.
#[derive(Clone, Debug, Default)]
pub(crate) struct Control {
    pub(crate) position: Vec3,
    pub(crate) destination: Option<Destination>,
    /// Destination interrupted by RunAway, restored on arrival
    pub(crate) suspended: Option<Destination>,
    pub(crate) waypoints: Vec<Vec3>,
    pub(crate) waypoint_index: usize,
    pub(crate) cycle_waypoints: bool,
    /// Positions visited, oldest first
    pub(crate) history: VecDeque<Vec3>,
    pub(crate) backtrack: bool,
    pub(crate) standing: bool,
    pub(crate) recalc_requested: bool,
}

impl Control {
    fn activate(&mut self, dest: Destination) {
        if dest.kind == DestType::RunAway {
            if let Some(active) = self.destination.filter(|d| d.kind != DestType::RunAway) {
                self.suspended = Some(active);
            }
        }
        self.destination = Some(dest);
        self.recalc_requested = true;
    }
}

/// Tick-owned state guarded by the `tick` lock.
struct TickState {
    anti_stuck: AntiStuck,
    threats: ThreatTracker,
    rng: StdRng,
}

/// Summary published after every tick.
#[derive(Clone, Copy, Debug, Default)]
struct Status {
    in_threat: bool,
    threat_ahead: Option<ThreatAhead>,
    anti_stuck: AntiStuckStatus,
    recalc_needed: bool,
}

/// Drives one agent over a navmesh.
pub struct NavigationEngine {
    config: NavigationConfig,
    threat_config: ThreatConfig,
    priorities: Priorities,
    navmesh: Arc<Navmesh>,
    tick: Mutex<TickState>,
    pub(crate) control: RwLock<Control>,
    pub(crate) path: RwLock<PathData>,
    status: RwLock<Status>,
    worker: Mutex<Option<WorkerLoop>>,
}

impl NavigationEngine {
    pub fn new(config: &MargaConfig, navmesh: Arc<Navmesh>) -> Self {
        Self::with_parts(
            config.navigation.clone(),
            config.anti_stuck.clone(),
            config.threat.clone(),
            navmesh,
        )
    }

    pub fn with_parts(
        config: NavigationConfig,
        anti_stuck: AntiStuckConfig,
        threat: ThreatConfig,
        navmesh: Arc<Navmesh>,
    ) -> Self {
        let tick = TickState {
            anti_stuck: AntiStuck::new(anti_stuck),
            threats: ThreatTracker::new(Duration::from_millis(threat.cooldown_ms)),
            rng: StdRng::seed_from_u64(config.rng_seed),
        };
        Self {
            priorities: Priorities::new(config.priorities.clone()),
            config,
            threat_config: threat,
            navmesh,
            tick: Mutex::new(tick),
            control: RwLock::new(Control::default()),
            path: RwLock::new(PathData::default()),
            status: RwLock::new(Status::default()),
            worker: Mutex::new(None),
        }
    }

    pub fn navmesh(&self) -> &Arc<Navmesh> {
        &self.navmesh
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn priorities(&self) -> &Priorities {
        &self.priorities
    }

    // ========================================================================
    // Destinations
    // ========================================================================

    /// Make `dest` the active destination.
    ///
    /// Rejected (returns `false`) while a destination of higher priority is
    /// active.
    pub fn set_destination(&self, dest: Destination) -> bool {
        let control = self.control.upgradable_read();
        if let Some(active) = control.destination {
            if !self.priorities.allows(active.kind, dest.kind) {
                tracing::debug!(
                    "Rejected {:?} destination at {}: {:?} is active",
                    dest.kind,
                    dest.position,
                    active.kind
                );
                return false;
            }
        }
        let mut control = RwLockUpgradableReadGuard::upgrade(control);
        tracing::info!("Destination {:?} at {}", dest.kind, dest.position);
        control.activate(dest);
        true
    }

    /// Drop the destination of `kind`, active or suspended. Returns whether
    /// anything was dropped.
    pub fn clear_destination(&self, kind: DestType) -> bool {
        let mut control = self.control.write();
        let mut cleared = false;

        if control.suspended.is_some_and(|d| d.kind == kind) {
            control.suspended = None;
            cleared = true;
        }
        if control.destination.is_some_and(|d| d.kind == kind) {
            control.destination = if kind == DestType::RunAway {
                control.suspended.take()
            } else {
                None
            };
            control.recalc_requested = true;
            cleared = true;
        }

        match kind {
            DestType::Waypoint => {
                control.waypoints.clear();
                control.waypoint_index = 0;
            }
            DestType::BackTrack => control.backtrack = false,
            _ => {}
        }
        if cleared {
            tracing::info!("Cleared {:?} destination", kind);
        }
        cleared
    }

    /// Follow `points` in order, restarting from the first one when `cycle`
    /// is set. An empty list clears the waypoint destination.
    pub fn set_waypoints(&self, points: Vec<Vec3>, cycle: bool) -> bool {
        let Some(&first) = points.first() else {
            return self.clear_destination(DestType::Waypoint);
        };
        let dest = Destination::new(DestType::Waypoint, first, self.config.destination_precision);

        let control = self.control.upgradable_read();
        if control.destination.is_some_and(|d| !self.priorities.allows(d.kind, DestType::Waypoint)) {
            return false;
        }
        let mut control = RwLockUpgradableReadGuard::upgrade(control);
        tracing::info!("Following {} waypoints (cycle: {})", points.len(), cycle);
        control.waypoints = points;
        control.waypoint_index = 0;
        control.cycle_waypoints = cycle;
        control.activate(dest);
        true
    }

    /// Head for the walkable point closest to the centre of a grid cell.
    pub fn set_grid_destination(&self, grid_id: GridCellId) -> bool {
        let Some(grid) = self.navmesh.grid_cell(grid_id) else {
            tracing::warn!("Unknown grid cell {}", grid_id);
            return false;
        };
        let center = grid.aabb().center();
        let Some(cell) = self
            .navmesh
            .get_cell_at(center, MovementFlags::WALK, grid.aabb().max_dimension_2d())
            .and_then(|id| self.navmesh.cell(id))
        else {
            tracing::warn!("Grid cell {} has no walkable cell", grid_id);
            return false;
        };
        let target = cell.align_point(cell.aabb.closest_point(center));
        self.set_destination(Destination::new(DestType::Grid, target, self.config.destination_precision))
    }

    /// Start or stop walking back along the recorded position history.
    pub fn set_backtrack(&self, enabled: bool) -> bool {
        if !enabled {
            return self.clear_destination(DestType::BackTrack);
        }

        let control = self.control.upgradable_read();
        if control.destination.is_some_and(|d| !self.priorities.allows(d.kind, DestType::BackTrack)) {
            return false;
        }
        let mut control = RwLockUpgradableReadGuard::upgrade(control);
        let Some(point) = control.history.pop_back() else {
            tracing::debug!("No position history to back-track");
            return false;
        };
        control.backtrack = true;
        let dest = Destination::new(DestType::BackTrack, point, self.config.destination_precision);
        control.activate(dest);
        tracing::info!("Back-tracking over {} positions", control.history.len() + 1);
        true
    }

    // ========================================================================
    // Host API
    // ========================================================================

    /// Report the agent position; also extends the position history.
    pub fn set_current_pos(&self, pos: Vec3) {
        let mut control = self.control.write();
        control.position = pos;
        if control.backtrack {
            return;
        }
        let far_enough = control
            .history
            .back()
            .is_none_or(|last| last.distance_2d(pos) >= self.config.history_spacing);
        if far_enough {
            control.history.push_back(pos);
            while control.history.len() > self.config.max_history {
                control.history.pop_front();
            }
        }
    }

    pub fn current_pos(&self) -> Vec3 {
        self.control.read().position
    }

    pub fn destination(&self) -> Option<Destination> {
        self.control.read().destination
    }

    /// Point the agent should move to now.
    ///
    /// `None` when there is nothing to follow or the path is being written.
    pub fn go_to_position(&self) -> Option<Vec3> {
        self.path.try_read().and_then(|path| path.target)
    }

    pub fn is_in_threat(&self) -> bool {
        self.status.read().in_threat
    }

    pub fn threat_ahead(&self) -> Option<ThreatAhead> {
        self.status.read().threat_ahead
    }

    /// Copy of the live path.
    pub fn path(&self) -> PathData {
        self.path.read().clone()
    }

    pub fn request_path_update(&self) {
        self.control.write().recalc_requested = true;
    }

    pub fn anti_stuck_level(&self) -> u8 {
        self.status.read().anti_stuck.level
    }

    pub fn anti_stuck_status(&self) -> AntiStuckStatus {
        self.status.read().anti_stuck
    }

    /// Whether a recompute is pending or the last search did not reach the
    /// destination.
    pub fn is_path_recalc_needed(&self) -> bool {
        self.control.read().recalc_requested || self.status.read().recalc_needed
    }

    pub fn set_standing_on_purpose(&self, standing: bool) {
        self.control.write().standing = standing;
    }

    /// Recorded positions, oldest first.
    pub fn history(&self) -> Vec<Vec3> {
        self.control.read().history.iter().copied().collect()
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Run one navigation tick.
    pub fn update(&self) -> Result<()> {
        self.update_at(Instant::now())
    }

    /// Run one navigation tick at the given time.
    pub fn update_at(&self, now: Instant) -> Result<()> {
        let regions = self.navmesh.regions();

        let mut tick = self.tick.lock();
        let tick = &mut *tick;
        tick.threats.refresh(&regions, now);

        let mut control = self.control.read().clone();
        let pos = control.position;

        // Threat
        let threat = tick.threats.threat_at(pos);
        let in_threat = threat > self.threat_config.threshold;
        let running = control.destination.is_some_and(|d| d.kind == DestType::RunAway);
        if in_threat && !running {
            tracing::warn!("Threat {:.2} at {}, running away", threat, pos);
            if let Some(dest) = self.escape_destination(tick, pos) {
                self.set_destination(dest);
                control = self.control.read().clone();
            }
        }

        // Anti-stuck
        tick.anti_stuck.set_standing_on_purpose(control.standing);
        let escalated = tick.anti_stuck.update(pos, control.destination.is_some(), now).is_some();

        let mut path = self.path.read().clone();
        let Some(dest) = control.destination else {
            let status = self.status_for(tick, pos, in_threat, &PathData::default());
            if path != PathData::default() {
                *self.path.write() = PathData::default();
            }
            *self.status.write() = status;
            return Ok(());
        };

        // Path maintenance
        let interval = tick
            .anti_stuck
            .recalc_interval(Duration::from_millis(self.config.path_recalc_interval_ms));
        let changed = path.destination != Some(dest);
        let expired = path.age(now).is_none_or(|age| age >= interval);
        let trigger = path.trigger_reached(pos, self.config.rough_trigger_radius);
        if control.recalc_requested || escalated || changed || expired || trigger {
            // Cleared before searching so a request made meanwhile is kept
            if control.recalc_requested {
                self.control.write().recalc_requested = false;
            }
            path = self.compute_path(tick, pos, dest, now);
        }

        // Follow
        let step = self
            .config
            .follow_strategy
            .step(&mut path, pos, &dest, self.config.node_precision, &self.navmesh);
        path.target = match step {
            FollowStep::Moving(p) => Some(p),
            FollowStep::Idle | FollowStep::Arrived => None,
        };
        if step == FollowStep::Arrived {
            self.on_arrival(dest);
        }

        let status = self.status_for(tick, pos, in_threat, &path);
        *self.path.write() = path;
        *self.status.write() = status;
        Ok(())
    }

    fn status_for(&self, tick: &TickState, pos: Vec3, in_threat: bool, path: &PathData) -> Status {
        let threat_ahead = if in_threat {
            None
        } else {
            tick.threats.threat_ahead(
                pos,
                path.remaining(),
                self.threat_config.detection_range,
                self.threat_config.threshold,
            )
        };
        let recalc_needed = path.destination.is_some() && path.outcome != Some(PathOutcome::Found);
        Status {
            in_threat,
            threat_ahead,
            anti_stuck: tick.anti_stuck.status(),
            recalc_needed,
        }
    }

    fn search_options(&self, jitter: f32, allow_disconnected: bool) -> SearchOptions {
        SearchOptions {
            flags: MovementFlags::WALK,
            max_jitter: jitter,
            deadline: Some(Instant::now() + Duration::from_millis(self.config.search_time_budget_ms)),
            allow_disconnected,
        }
    }

    fn compute_path(&self, tick: &mut TickState, pos: Vec3, dest: Destination, now: Instant) -> PathData {
        let bounced = tick.anti_stuck.search_start(pos, dest.position);
        let start = if bounced != pos
            && self
                .navmesh
                .get_cell_at(bounced, MovementFlags::WALK, 0.0)
                .is_some()
        {
            bounced
        } else {
            pos
        };

        // Exploration targets must be reached exactly or given up on
        let options = self.search_options(tick.anti_stuck.jitter(), dest.kind != DestType::Explore);
        let result = self
            .navmesh
            .find_path(start, dest.position, dest.precision, &options, &mut tick.rng);

        match result.outcome {
            PathOutcome::Found => tracing::debug!(
                "Path to {} over {} cells ({} expanded)",
                dest.position,
                result.nodes.len(),
                result.expanded
            ),
            PathOutcome::Partial => tracing::debug!("Partial path towards {}", dest.position),
            PathOutcome::TimedOut => tracing::warn!("Path search to {} timed out", dest.position),
            PathOutcome::NotFound => tracing::warn!("No path from {} to {}", start, dest.position),
        }

        let mut path = PathData::from_search(&result, dest, self.config.rough_path_max_nodes, now);
        if let Some(first) = path.points.first_mut() {
            *first = pos;
        }
        path
    }

    fn escape_destination(&self, tick: &mut TickState, pos: Vec3) -> Option<Destination> {
        let threshold = self.threat_config.threshold;
        let strategy = ThreatEscapeStrategy::new(threshold, tick.threats.dangerous(threshold));
        let options = self.search_options(0.0, false);
        let result = self.navmesh.find_path_with(pos, &strategy, &options, &mut tick.rng);
        match result.points.last() {
            Some(&target) if result.is_found() => {
                Some(Destination::new(DestType::RunAway, target, self.threat_config.escape_precision))
            }
            _ => {
                tracing::warn!("No escape from threat at {} ({:?})", pos, result.outcome);
                None
            }
        }
    }

    fn on_arrival(&self, dest: Destination) {
        let mut control = self.control.write();
        if control.destination != Some(dest) {
            return;
        }
        if dest.stop == StopBehavior::Hold {
            return;
        }
        tracing::info!("Reached {:?} destination at {}", dest.kind, dest.position);

        control.destination = match dest.kind {
            DestType::Waypoint => {
                control.waypoint_index += 1;
                if control.waypoint_index >= control.waypoints.len() && control.cycle_waypoints {
                    control.waypoint_index = 0;
                }
                match control.waypoints.get(control.waypoint_index) {
                    Some(&p) => Some(Destination::new(DestType::Waypoint, p, dest.precision)),
                    None => {
                        control.waypoints.clear();
                        control.waypoint_index = 0;
                        None
                    }
                }
            }
            DestType::BackTrack => match control.history.pop_back() {
                Some(p) => Some(Destination::new(DestType::BackTrack, p, dest.precision)),
                None => {
                    control.backtrack = false;
                    None
                }
            },
            DestType::RunAway => control.suspended.take(),
            _ => None,
        };
        if control.destination.is_some() {
            control.recalc_requested = true;
        }
    }

    // ========================================================================
    // Background loop
    // ========================================================================

    /// Run [`NavigationEngine::update`] on a background thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| w.is_running()) {
            return Ok(());
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = Duration::from_millis(self.config.update_interval_ms);
        *worker = Some(WorkerLoop::spawn("navigation", interval, move || match weak.upgrade() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use bhumi_mesh::{Aabb, GridCellData};

    fn corridor() -> Arc<Navmesh> {
        let navmesh = Arc::new(Navmesh::default());
        for i in 0..5 {
            let x = i as f32 * 10.0;
            navmesh.add(
                GridCellData::single(Aabb::from_coords(x, 0.0, 0.0, x + 10.0, 10.0, 0.0)),
                false,
            );
        }
        navmesh.update();
        navmesh
    }

    fn engine(navmesh: Arc<Navmesh>) -> NavigationEngine {
        NavigationEngine::new(&MargaConfig::default(), navmesh)
    }

    #[test]
    fn test_path_and_target() {
        let nav = engine(corridor());
        nav.set_current_pos(Vec3::new(2.0, 5.0, 0.0));
        assert!(nav.set_destination(Destination::new(DestType::User, Vec3::new(45.0, 5.0, 0.0), 0.5)));

        nav.update().unwrap();
        let path = nav.path();
        assert_eq!(path.outcome, Some(PathOutcome::Found));
        assert_eq!(path.nodes.len(), 5);
        // First border on the way, not the distant destination
        assert_eq!(nav.go_to_position(), Some(Vec3::new(10.0, 5.0, 0.0)));
        assert!(!nav.is_path_recalc_needed());
    }

    #[test]
    fn test_requested_recompute_runs_once() {
        let nav = engine(corridor());
        nav.set_current_pos(Vec3::new(2.0, 5.0, 0.0));
        nav.set_destination(Destination::new(DestType::User, Vec3::new(45.0, 5.0, 0.0), 0.5));
        nav.update().unwrap();
        let first = nav.path().computed_at;
        assert!(!nav.control.read().recalc_requested);

        // No request: the path is kept
        nav.update().unwrap();
        assert_eq!(nav.path().computed_at, first);

        nav.request_path_update();
        nav.update().unwrap();
        assert!(nav.path().computed_at > first);
        assert!(!nav.control.read().recalc_requested);
    }

    #[test]
    fn test_arrival_clears_destination() {
        let nav = engine(corridor());
        nav.set_current_pos(Vec3::new(2.0, 5.0, 0.0));
        nav.set_destination(Destination::new(DestType::User, Vec3::new(2.2, 5.0, 0.0), 0.5));
        nav.update().unwrap();
        assert!(nav.destination().is_none());
        assert!(nav.go_to_position().is_none());
    }

    #[test]
    fn test_hold_keeps_destination() {
        let nav = engine(corridor());
        nav.set_current_pos(Vec3::new(2.0, 5.0, 0.0));
        nav.set_destination(Destination::new(DestType::User, Vec3::new(2.2, 5.0, 0.0), 0.5).holding());
        nav.update().unwrap();
        assert!(nav.destination().is_some());
        assert!(nav.go_to_position().is_none());
    }

    #[test]
    fn test_waypoints_advance_and_cycle() {
        let nav = engine(corridor());
        let points = vec![Vec3::new(5.0, 5.0, 0.0), Vec3::new(25.0, 5.0, 0.0)];
        nav.set_current_pos(points[0]);
        assert!(nav.set_waypoints(points.clone(), true));

        nav.update().unwrap();
        assert_eq!(nav.destination().map(|d| d.position), Some(points[1]));

        nav.set_current_pos(points[1]);
        nav.update().unwrap();
        assert_eq!(nav.destination().map(|d| d.position), Some(points[0]));
    }

    #[test]
    fn test_backtrack_walks_history() {
        let nav = engine(corridor());
        for x in [2.0, 6.0, 10.0] {
            nav.set_current_pos(Vec3::new(x, 5.0, 0.0));
        }
        assert_eq!(nav.history().len(), 3);

        assert!(nav.set_backtrack(true));
        // Popped the newest position, which is where the agent stands
        nav.update().unwrap();
        assert_eq!(nav.destination().map(|d| d.position), Some(Vec3::new(6.0, 5.0, 0.0)));

        nav.set_current_pos(Vec3::new(6.0, 5.0, 0.0));
        nav.update().unwrap();
        assert_eq!(nav.destination().map(|d| d.position), Some(Vec3::new(2.0, 5.0, 0.0)));

        nav.set_current_pos(Vec3::new(2.0, 5.0, 0.0));
        nav.update().unwrap();
        assert!(nav.destination().is_none());
        assert!(!nav.control.read().backtrack);
    }

    #[test]
    fn test_grid_destination() {
        let navmesh = corridor();
        let nav = engine(Arc::clone(&navmesh));
        let grid = navmesh.grid_cell_ids()[2];
        assert!(nav.set_grid_destination(grid));
        let dest = nav.destination().unwrap();
        assert_eq!(dest.kind, DestType::Grid);
        approx::assert_relative_eq!(dest.position.x, 25.0, epsilon = 1e-3);
        assert!(!nav.set_grid_destination(999));
    }
}
