//! Integration tests for the navigation and exploration engines over a live navmesh.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bhumi_mesh::algorithms::PathOutcome;
use bhumi_mesh::{Aabb, GridCellData, Navmesh, Region, Vec3};
use marga_nav::{
    DestType, Destination, ExplorationEngine, ExploreCell, ExploreCellId, ExploreObserver, MargaConfig,
    NavigationEngine,
};

fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
    Aabb::from_coords(x0, y0, 0.0, x1, y1, 0.0)
}

/// Row of `n` 10×10 grid cells starting at the origin.
fn corridor(n: usize) -> Arc<Navmesh> {
    let navmesh = Navmesh::default();
    for i in 0..n {
        let x = i as f32 * 10.0;
        navmesh.add(GridCellData::single(square(x, 0.0, x + 10.0, 10.0)), false);
    }
    navmesh.update();
    Arc::new(navmesh)
}

fn user(x: f32, y: f32) -> Destination {
    Destination::new(DestType::User, Vec3::new(x, y, 0.0), 0.5)
}

#[derive(Default)]
struct Counter {
    added: AtomicUsize,
    explored: AtomicUsize,
}

impl ExploreObserver for Counter {
    fn on_explore_cell_added(&self, _cell: &ExploreCell) {
        self.added.fetch_add(1, Ordering::SeqCst);
    }

    fn on_explore_cell_explored(&self, _id: ExploreCellId) {
        self.explored.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Navigation
// ============================================================================

#[test]
fn test_lower_priority_destination_rejected() {
    let navmesh = corridor(3);
    let nav = NavigationEngine::new(&MargaConfig::default(), navmesh);

    assert!(nav.set_destination(user(25.0, 5.0)));
    assert!(!nav.set_destination(Destination::new(DestType::Explore, Vec3::new(15.0, 5.0, 0.0), 0.5)));
    assert_eq!(nav.destination().map(|d| d.kind), Some(DestType::User));

    // Equal priority replaces
    assert!(nav.set_destination(user(15.0, 5.0)));
    assert_eq!(nav.destination().map(|d| d.position), Some(Vec3::new(15.0, 5.0, 0.0)));
}

#[test]
fn test_anti_stuck_escalates_without_movement() {
    let navmesh = corridor(3);
    let nav = NavigationEngine::new(&MargaConfig::default(), navmesh);
    nav.set_current_pos(Vec3::new(5.0, 5.0, 0.0));
    nav.set_destination(user(25.0, 5.0));

    let t0 = Instant::now();
    nav.update_at(t0).unwrap();
    assert_eq!(nav.anti_stuck_level(), 0);
    assert!(nav.go_to_position().is_some());

    nav.update_at(t0 + Duration::from_secs(3)).unwrap();
    assert_eq!(nav.anti_stuck_level(), 1);

    nav.update_at(t0 + Duration::from_secs(5)).unwrap();
    assert_eq!(nav.anti_stuck_level(), 2);
    assert!(nav.anti_stuck_status().bounce);

    nav.update_at(t0 + Duration::from_secs(9)).unwrap();
    assert_eq!(nav.anti_stuck_level(), 3);

    // Moving clears the escalation
    nav.set_current_pos(Vec3::new(8.0, 5.0, 0.0));
    nav.update_at(t0 + Duration::from_secs(10)).unwrap();
    assert_eq!(nav.anti_stuck_level(), 0);
}

#[test]
fn test_standing_on_purpose_never_escalates() {
    let navmesh = corridor(2);
    let nav = NavigationEngine::new(&MargaConfig::default(), navmesh);
    nav.set_current_pos(Vec3::new(5.0, 5.0, 0.0));
    nav.set_destination(user(15.0, 5.0));
    nav.set_standing_on_purpose(true);

    let t0 = Instant::now();
    nav.update_at(t0).unwrap();
    nav.update_at(t0 + Duration::from_secs(20)).unwrap();
    assert_eq!(nav.anti_stuck_level(), 0);
}

#[test]
fn test_threat_preempts_and_suspends_destination() {
    let navmesh = corridor(3);
    let nav = NavigationEngine::new(&MargaConfig::default(), Arc::clone(&navmesh));
    nav.set_current_pos(Vec3::new(5.0, 5.0, 0.0));
    assert!(nav.set_destination(user(25.0, 5.0)));

    navmesh.set_regions(vec![Region::new(square(0.0, 0.0, 12.0, 10.0), 1.0, 1.0)]);
    navmesh.update();
    nav.update().unwrap();

    assert!(nav.is_in_threat());
    let dest = nav.destination().unwrap();
    assert_eq!(dest.kind, DestType::RunAway);
    assert!(dest.position.x > 12.0);

    // Nothing outranks running away
    assert!(!nav.set_destination(user(15.0, 5.0)));

    // Dropping the escape brings back the interrupted destination
    assert!(nav.clear_destination(DestType::RunAway));
    assert_eq!(nav.destination(), Some(user(25.0, 5.0)));
}

// ============================================================================
// Exploration
// ============================================================================

#[test]
fn test_area_tiled_and_fully_explored() {
    let navmesh = Navmesh::default();
    navmesh.add(GridCellData::single(square(0.0, 0.0, 200.0, 200.0)), false);
    navmesh.update();
    let navmesh = Arc::new(navmesh);

    let mut config = MargaConfig::default();
    config.exploration.explore_cell_size = 90.0;
    let nav = Arc::new(NavigationEngine::new(&config, Arc::clone(&navmesh)));
    let exploration = ExplorationEngine::new(&config, navmesh, nav);
    let counter = Arc::new(Counter::default());
    exploration.add_observer(counter.clone());

    exploration.refresh();
    assert_eq!(exploration.explore_cells_count(), 9);
    assert_eq!(counter.added.load(Ordering::SeqCst), 9);
    approx::assert_relative_eq!(exploration.get_global_explored_percent(), 0.0);
    assert!(!exploration.is_exploration_finished());

    let covered: f32 = exploration.explore_cells().iter().map(|c| c.area).sum();
    approx::assert_relative_eq!(covered, 40_000.0, epsilon = 1e-2);

    exploration.mark_all_explored();
    approx::assert_relative_eq!(exploration.get_global_explored_percent(), 100.0);
    assert!(exploration.is_exploration_finished());
    assert_eq!(counter.explored.load(Ordering::SeqCst), 9);
}

#[test]
fn test_unreachable_cell_delayed_then_explored() {
    let navmesh = corridor(3);
    let mut config = MargaConfig::default();
    config.exploration.explore_cell_size = 10.0;
    let nav = Arc::new(NavigationEngine::new(&config, Arc::clone(&navmesh)));
    let exploration = ExplorationEngine::new(&config, navmesh, nav);
    exploration.refresh();

    let id = exploration.explore_cell_at(Vec3::new(25.0, 5.0, 0.0)).unwrap();
    exploration.report_unreachable(id);
    let cell = exploration.explore_cell(id).unwrap();
    assert!(cell.delayed);
    assert!(!cell.explored);

    exploration.report_unreachable(id);
    let cell = exploration.explore_cell(id).unwrap();
    assert!(!cell.delayed);
    assert!(cell.explored);
}

/// Two-square corridor with the agent's square already explored.
fn two_squares(config: &MargaConfig, agent: Vec3) -> (Arc<NavigationEngine>, ExplorationEngine, ExploreCellId) {
    let navmesh = corridor(2);
    let nav = Arc::new(NavigationEngine::new(config, Arc::clone(&navmesh)));
    let exploration = ExplorationEngine::new(config, navmesh, Arc::clone(&nav));
    nav.set_current_pos(agent);
    exploration.refresh();
    exploration.mark_explored(exploration.explore_cell_at(Vec3::new(5.0, 5.0, 0.0)).unwrap());
    let far = exploration.explore_cell_at(Vec3::new(15.0, 5.0, 0.0)).unwrap();
    (nav, exploration, far)
}

#[test]
fn test_unreachable_target_needs_two_searches() {
    let mut config = MargaConfig::default();
    config.exploration.explore_cell_size = 10.0;
    // Just off the mesh: close enough to pick targets, too far to start a search
    let (nav, exploration, far) = two_squares(&config, Vec3::new(5.0, -1.5, 0.0));

    exploration.update().unwrap();
    assert_eq!(exploration.current_target(), Some(far));
    assert_eq!(nav.destination().and_then(|d| d.tag), Some(u64::from(far)));

    // First failed search delays the target
    nav.update().unwrap();
    assert_eq!(nav.path().outcome, Some(PathOutcome::NotFound));
    exploration.update().unwrap();
    let cell = exploration.explore_cell(far).unwrap();
    assert!(cell.delayed && !cell.explored);

    // Re-selected, but the old verdict does not count twice
    exploration.update().unwrap();
    exploration.update().unwrap();
    assert_eq!(exploration.current_target(), Some(far));
    let cell = exploration.explore_cell(far).unwrap();
    assert!(cell.delayed && !cell.explored);

    // A second search fails as well
    nav.update().unwrap();
    exploration.update().unwrap();
    let cell = exploration.explore_cell(far).unwrap();
    assert!(cell.explored && !cell.delayed);

    exploration.update().unwrap();
    assert!(nav.destination().is_none());
    assert!(exploration.is_exploration_finished());
}

#[test]
fn test_repeated_search_timeouts_give_up_target() {
    let mut config = MargaConfig::default();
    config.exploration.explore_cell_size = 10.0;
    config.exploration.max_search_timeouts = 3;
    config.navigation.search_time_budget_ms = 0;
    let (nav, exploration, far) = two_squares(&config, Vec3::new(5.0, 5.0, 0.0));

    let search = || {
        nav.request_path_update();
        nav.update().unwrap();
        exploration.update().unwrap();
    };

    exploration.update().unwrap();
    assert_eq!(exploration.current_target(), Some(far));
    search();
    search();
    assert!(!exploration.explore_cell(far).unwrap().delayed);
    search();
    assert!(exploration.explore_cell(far).unwrap().delayed);

    // Picked again from the delayed pool, then given up for good
    exploration.update().unwrap();
    assert_eq!(exploration.current_target(), Some(far));
    for _ in 0..3 {
        search();
    }
    assert!(exploration.explore_cell(far).unwrap().explored);
}

#[test]
fn test_cells_added_later_are_tiled() {
    let navmesh = corridor(1);
    let mut config = MargaConfig::default();
    config.exploration.explore_cell_size = 10.0;
    let nav = Arc::new(NavigationEngine::new(&config, Arc::clone(&navmesh)));
    let exploration = ExplorationEngine::new(&config, Arc::clone(&navmesh), nav);
    exploration.refresh();
    assert_eq!(exploration.explore_cells_count(), 1);

    navmesh.add(GridCellData::single(square(10.0, 0.0, 20.0, 10.0)), true);
    navmesh.update();
    exploration.refresh();
    assert_eq!(exploration.explore_cells_count(), 2);

    let a = exploration.explore_cell_at(Vec3::new(5.0, 5.0, 0.0)).unwrap();
    let b = exploration.explore_cell_at(Vec3::new(15.0, 5.0, 0.0)).unwrap();
    assert!(exploration.explore_cell(a).unwrap().is_neighbour(b));
}
