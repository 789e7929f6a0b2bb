//! Integration tests for the navmesh: overlay, patches, search and persistence.

use std::io::Cursor;

use bhumi_mesh::algorithms::{SearchOptions, VisitOptions, visit_breadth_first};
use bhumi_mesh::io::BinWriter;
use bhumi_mesh::{Aabb, GridCellData, MovementFlags, Navmesh, NavmeshError, Region, Vec3};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
    Aabb::from_coords(x0, y0, 0.0, x1, y1, 0.0)
}

/// Row of `n` 10×10 grid cells starting at the origin.
fn corridor(n: usize) -> Navmesh {
    let navmesh = Navmesh::default();
    for i in 0..n {
        let x = i as f32 * 10.0;
        navmesh.add(GridCellData::single(square(x, 0.0, x + 10.0, 10.0)), false);
    }
    navmesh.update();
    navmesh
}

fn connected(navmesh: &Navmesh, a: Vec3, b: Vec3) -> bool {
    navmesh.are_connected(a, b, MovementFlags::WALK, 0.5, 0.5).is_some()
}

// ============================================================================
// Graph invariants
// ============================================================================

#[test]
fn test_edges_stay_symmetric_through_overlay_changes() {
    let navmesh = Navmesh::default();
    for ix in 0..5 {
        for iy in 0..5 {
            let (x, y) = (ix as f32 * 10.0, iy as f32 * 10.0);
            navmesh.add(GridCellData::single(square(x, y, x + 10.0, y + 10.0)), false);
        }
    }
    assert!(navmesh.is_symmetric());

    navmesh.set_regions(vec![
        Region::new(square(5.0, 5.0, 25.0, 15.0), 2.0, 0.5),
        Region::new(square(20.0, 20.0, 35.0, 45.0), 4.0, 1.0),
        Region::blocker(square(40.0, 0.0, 45.0, 50.0)),
    ]);
    navmesh.update();
    assert!(navmesh.is_symmetric());

    navmesh.set_regions(vec![Region::new(square(5.0, 5.0, 25.0, 15.0), 2.0, 0.5)]);
    navmesh.update();
    assert!(navmesh.is_symmetric());

    navmesh.set_regions(Vec::new());
    navmesh.update();
    assert!(navmesh.is_symmetric());
    assert_eq!(navmesh.cells_count(), 25);
}

#[test]
fn test_patches_partition_enabled_cells() {
    let navmesh = Navmesh::default();
    navmesh.add(GridCellData::single(square(0.0, 0.0, 10.0, 10.0)), false);
    navmesh.add(GridCellData::single(square(10.0, 0.0, 20.0, 10.0)), false);
    navmesh.add(GridCellData::single(square(50.0, 0.0, 60.0, 10.0)), false);
    navmesh.update();

    let patches = navmesh.patches();
    assert_eq!(patches.len(), 2);
    let total: usize = patches.iter().map(|p| p.cells_count()).sum();
    assert_eq!(total, 3);
    for id in 0..3 {
        assert_eq!(patches.iter().filter(|p| p.contains_cell(id)).count(), 1);
    }

    assert!(connected(&navmesh, Vec3::new(1.0, 1.0, 0.0), Vec3::new(19.0, 9.0, 0.0)));
    assert!(!connected(&navmesh, Vec3::new(1.0, 1.0, 0.0), Vec3::new(55.0, 5.0, 0.0)));
}

// ============================================================================
// Region overlay
// ============================================================================

#[test]
fn test_reapplying_regions_is_idempotent() {
    let navmesh = corridor(3);
    let region = Region::new(square(12.0, 2.0, 18.0, 8.0), 3.0, 1.0);

    navmesh.set_regions(vec![region]);
    let first = navmesh.update();
    assert!(first.overlay.created > 0);
    assert!(first.patches_rebuilt);

    let cells_before = navmesh.cells_count();
    let version_before = navmesh.patches_version();

    navmesh.set_regions(vec![region]);
    let second = navmesh.update();
    assert_eq!(second.overlay.created, 0);
    assert_eq!(second.overlay.removed, 0);
    assert!(!second.patches_rebuilt);
    assert_eq!(navmesh.cells_count(), cells_before);
    assert_eq!(navmesh.patches_version(), version_before);
}

#[test]
fn test_blocker_is_reversible() {
    let navmesh = corridor(3);
    let a = Vec3::new(5.0, 5.0, 0.0);
    let b = Vec3::new(25.0, 5.0, 0.0);
    assert!(connected(&navmesh, a, b));

    navmesh.set_regions(vec![Region::blocker(square(10.0, -1.0, 20.0, 11.0))]);
    navmesh.update();
    assert!(!connected(&navmesh, a, b));
    assert!(navmesh.cell(1).is_some_and(|c| !c.is_enabled()));

    navmesh.set_regions(Vec::new());
    navmesh.update();
    assert!(connected(&navmesh, a, b));
    assert_eq!(navmesh.cells_count(), 3);
    assert!(navmesh.cell(1).is_some_and(|c| c.is_enabled()));
}

#[test]
fn test_region_cost_reaches_replacements() {
    let navmesh = corridor(3);
    navmesh.set_regions(vec![Region::new(square(12.0, 2.0, 18.0, 8.0), 3.0, 1.0)]);
    navmesh.update();

    let inside = navmesh
        .get_cell_at(Vec3::new(15.0, 5.0, 0.0), MovementFlags::WALK, 0.0)
        .and_then(|id| navmesh.cell(id));
    let inside = inside.expect("cell under the region");
    assert!(inside.is_replacement());
    assert_eq!(inside.movement_cost_mult, 3.0);
    assert_eq!(inside.threat, 1.0);

    // Replacements carry the links to the untouched neighbours
    assert!(connected(&navmesh, Vec3::new(1.0, 1.0, 0.0), Vec3::new(29.0, 9.0, 0.0)));
}

#[test]
fn test_overlay_keeps_base_cells() {
    let navmesh = corridor(3);
    navmesh.set_regions(vec![Region::new(square(12.0, 2.0, 18.0, 8.0), 3.0, 1.0)]);
    navmesh.update();
    assert_eq!(navmesh.base_cells_count(), 3);
    assert!(navmesh.cells_count() > 3);
    assert_eq!(navmesh.prune_stale_edges(0, 1e-3), 0);
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_ray_cast_stops_at_mesh_edge() {
    let navmesh = corridor(3);
    let origin = Vec3::new(1.0, 5.0, 0.0);

    assert!(navmesh.ray_cast(origin, Vec3::new(25.0, 5.0, 0.0), MovementFlags::WALK).clear);
    assert!(navmesh.ray_cast_2d(origin, Vec3::new(25.0, 8.0, 0.0), MovementFlags::WALK).clear);
    assert!(!navmesh.ray_cast_2d(origin, Vec3::new(45.0, 5.0, 0.0), MovementFlags::WALK).clear);
    assert!(!navmesh.ray_cast_2d(origin, Vec3::new(25.0, 15.0, 0.0), MovementFlags::WALK).clear);
}

#[test]
fn test_top_down_lookup_ignores_height() {
    let navmesh = corridor(2);
    let above = Vec3::new(15.0, 5.0, 50.0);
    assert_eq!(navmesh.get_cell_at_2d(above, MovementFlags::WALK, 0.0), Some(1));
    assert_eq!(navmesh.try_with_graph(|g| g.len()), Some(2));
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn test_astar_hops_match_breadth_first_depth() {
    // L-shaped corridor of five cells
    let navmesh = Navmesh::default();
    for (x0, y0) in [(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (20.0, 10.0), (20.0, 20.0)] {
        navmesh.add(GridCellData::single(square(x0, y0, x0 + 10.0, y0 + 10.0)), false);
    }
    navmesh.update();

    let mut rng = StdRng::seed_from_u64(11);
    let result = navmesh.find_path(
        Vec3::new(5.0, 5.0, 0.0),
        Vec3::new(25.0, 25.0, 0.0),
        0.5,
        &SearchOptions::default(),
        &mut rng,
    );
    assert!(result.is_found());

    let visited = navmesh.with_graph(|g| visit_breadth_first(g, 0, &VisitOptions::with_flags(MovementFlags::WALK)));
    let target = visited.iter().find(|v| v.id == 4).expect("target visited");
    assert_eq!(result.nodes.len() - 1, target.depth);
    assert_eq!(result.nodes, vec![0, 1, 2, 3, 4]);
    assert_eq!(result.points.first(), Some(&Vec3::new(5.0, 5.0, 0.0)));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_text_file_round_trip() {
    let navmesh = corridor(3);
    navmesh.set_regions(vec![Region::new(square(12.0, 2.0, 18.0, 8.0), 3.0, 1.0)]);
    navmesh.update();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mesh.txt");
    navmesh.dump_file(&path).unwrap();

    let copy = Navmesh::default();
    assert_eq!(copy.load_file(&path).unwrap(), 3);
    copy.update();
    assert_eq!(copy.dump_text(), navmesh.dump_text());
    assert_eq!(copy.cells_count(), navmesh.cells_count());
    assert_eq!(copy.patches_count(), navmesh.patches_count());
}

#[test]
fn test_snapshot_file_round_trip() {
    let navmesh = corridor(4);
    navmesh.set_regions(vec![Region::blocker(square(20.0, 0.0, 25.0, 10.0))]);
    navmesh.update();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mesh.bin");
    navmesh.save_snapshot(&path).unwrap();

    let copy = Navmesh::default();
    copy.load_snapshot(&path).unwrap();
    assert_eq!(copy.cells_count(), navmesh.cells_count());
    assert_eq!(copy.patches(), navmesh.patches());
    assert!(copy.is_symmetric());
    assert_eq!(
        connected(&copy, Vec3::new(1.0, 1.0, 0.0), Vec3::new(39.0, 9.0, 0.0)),
        connected(&navmesh, Vec3::new(1.0, 1.0, 0.0), Vec3::new(39.0, 9.0, 0.0)),
    );
}

#[test]
fn test_malformed_text_leaves_navmesh_untouched() {
    let navmesh = corridor(2);
    let input = "g 100 0 0 110 10 0\nn 100 0 0 110 10 0\nn 100 0 0 oops 10 0\n";

    match navmesh.load_text(input) {
        Err(NavmeshError::Parse { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected parse error, got {:?}", other),
    }
    assert_eq!(navmesh.grid_cells_count(), 2);
    assert_eq!(navmesh.cells_count(), 2);
}

#[test]
fn test_snapshot_with_dangling_edge_is_rejected() {
    let mut buf = Vec::new();
    {
        let mut w = BinWriter::new(&mut buf);
        w.header(b"BHNM", 1).unwrap();
        for counter in [10, 10, 10] {
            w.u32(counter).unwrap();
        }
        w.bool(false).unwrap();

        // One grid cell holding cell 0
        w.len(1).unwrap();
        w.u32(0).unwrap();
        w.aabb(&square(0.0, 0.0, 10.0, 10.0)).unwrap();
        w.ids(&[0]).unwrap();
        w.ids(&[]).unwrap();
        w.ids(&[]).unwrap();

        // Cell 0 with an edge to the missing cell 5
        w.len(1).unwrap();
        w.u32(0).unwrap();
        w.aabb(&square(0.0, 0.0, 10.0, 10.0)).unwrap();
        w.flags(MovementFlags::WALK).unwrap();
        w.f32(1.0).unwrap();
        w.f32(0.0).unwrap();
        w.u32(0).unwrap();
        w.bool(false).unwrap();
        w.bool(false).unwrap();
        w.len(1).unwrap();
        w.u32(5).unwrap();
        w.vec3(Vec3::new(10.0, 5.0, 0.0)).unwrap();
        w.flags(MovementFlags::WALK).unwrap();
        w.f32(10.0).unwrap();

        // No regions, overlay, blockers or patches
        w.len(0).unwrap();
        w.bool(false).unwrap();
        w.len(0).unwrap();
        w.len(0).unwrap();
        w.u64(0).unwrap();
        w.len(0).unwrap();
    }

    let navmesh = corridor(1);
    let result = navmesh.read_snapshot(&mut Cursor::new(buf));
    assert!(matches!(result, Err(NavmeshError::InvalidSnapshot(_))));
    assert_eq!(navmesh.cells_count(), 1);
}
