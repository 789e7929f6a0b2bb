//! Square lattice tiling of discovered terrain.

use std::collections::BTreeSet;

use bhumi_mesh::algorithms::GraphNode;
use bhumi_mesh::{Aabb, CellId, MovementFlags, Navmesh};

/// Discovered terrain inside one lattice square.
#[derive(Clone, Debug)]
pub(crate) struct Tile {
    pub(crate) square: (i32, i32),
    pub(crate) aabb: Aabb,
    pub(crate) cells: Vec<CellId>,
    pub(crate) area: f32,
    pub(crate) reach: BTreeSet<CellId>,
}

/// Lattice squares overlapping the box with positive area.
pub(crate) fn squares_overlapping(aabb: &Aabb, size: f32) -> Vec<(i32, i32)> {
    let x0 = (aabb.min.x / size).floor() as i32;
    let y0 = (aabb.min.y / size).floor() as i32;
    // A max edge on a lattice line does not reach into the next square
    let x1 = ((aabb.max.x / size).ceil() as i32 - 1).max(x0);
    let y1 = ((aabb.max.y / size).ceil() as i32 - 1).max(y0);

    let mut squares = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
    for x in x0..=x1 {
        for y in y0..=y1 {
            squares.push((x, y));
        }
    }
    squares
}

/// Full square footprint, spanning every height.
pub(crate) fn square_box(square: (i32, i32), size: f32) -> Aabb {
    let (x, y) = (square.0 as f32 * size, square.1 as f32 * size);
    Aabb::from_coords(x, y, f32::MIN, x + size, y + size, f32::MAX)
}

/// Aggregate the walkable cells inside a square. `None` when nothing with
/// positive area was discovered there.
pub(crate) fn build_tile(navmesh: &Navmesh, square: (i32, i32), size: f32) -> Option<Tile> {
    let footprint = square_box(square, size);
    let candidates = navmesh.get_cells_in_box(&footprint, MovementFlags::WALK);
    if candidates.is_empty() {
        return None;
    }

    navmesh.with_graph(|arena| {
        let mut cells = Vec::new();
        let mut area = 0.0;
        let mut extent: Option<Aabb> = None;
        let mut reach = BTreeSet::new();

        for id in candidates {
            let Some(cell) = arena.get(id) else {
                continue;
            };
            let Some(clipped) = cell.aabb.clip_2d(&footprint) else {
                continue;
            };
            area += clipped.area_2d();
            extent = Some(extent.map_or(clipped, |e| e.union(&clipped)));
            cells.push(id);
            reach.insert(id);
            reach.extend(cell.edges().iter().map(|n| n.cell_id));
        }

        extent.map(|aabb| Tile {
            square,
            aabb,
            cells,
            area,
            reach,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bhumi_mesh::GridCellData;

    #[test]
    fn test_squares_overlapping() {
        let squares = squares_overlapping(&Aabb::from_coords(0.0, 0.0, 0.0, 200.0, 200.0, 0.0), 90.0);
        assert_eq!(squares.len(), 9);
        assert!(squares.contains(&(2, 2)));

        // Edge on a lattice line
        let squares = squares_overlapping(&Aabb::from_coords(0.0, 0.0, 0.0, 90.0, 90.0, 0.0), 90.0);
        assert_eq!(squares, vec![(0, 0)]);

        let squares = squares_overlapping(&Aabb::from_coords(-5.0, 1.0, 0.0, 5.0, 2.0, 0.0), 10.0);
        assert_eq!(squares, vec![(-1, 0), (0, 0)]);
    }

    #[test]
    fn test_tile_clips_to_discovered_extent() {
        let navmesh = Navmesh::default();
        navmesh.add(GridCellData::single(Aabb::from_coords(0.0, 0.0, 0.0, 200.0, 200.0, 0.0)), false);

        let corner = build_tile(&navmesh, (2, 2), 90.0).unwrap();
        assert!(corner.aabb.approx_eq(&Aabb::from_coords(180.0, 180.0, 0.0, 200.0, 200.0, 0.0), 1e-4));
        approx::assert_relative_eq!(corner.area, 400.0);

        let inner = build_tile(&navmesh, (0, 0), 90.0).unwrap();
        approx::assert_relative_eq!(inner.area, 8100.0);
        assert_eq!(inner.cells.len(), 1);

        assert!(build_tile(&navmesh, (3, 0), 90.0).is_none());
    }
}
