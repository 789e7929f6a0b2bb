//! Cost and threat overlays.
//!
//! A region never touches base cells directly. The navmesh overlay pass uses
//! [`split_cell_by_regions`] to carve a covered cell into replacement pieces.

use serde::{Deserialize, Serialize};

use crate::geometry::Aabb;

/// Box-shaped cost/threat overlay. A negative cost multiplier blocks movement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub aabb: Aabb,
    pub movement_cost_mult: f32,
    pub threat: f32,
}

impl Region {
    pub fn new(aabb: Aabb, movement_cost_mult: f32, threat: f32) -> Self {
        Self {
            aabb,
            movement_cost_mult,
            threat,
        }
    }

    /// Impassable region
    pub fn blocker(aabb: Aabb) -> Self {
        Self::new(aabb, -1.0, 0.0)
    }

    #[inline]
    pub fn is_blocker(&self) -> bool {
        self.movement_cost_mult < 0.0
    }
}

/// How a region's values combine with the values of the cell it covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostCombine {
    /// Sum of both values
    Additive,
    /// Product of both values
    Multiplicative,
    /// Worse of both values
    #[default]
    Max,
}

impl CostCombine {
    #[inline]
    pub fn combine(self, base: f32, overlay: f32) -> f32 {
        match self {
            CostCombine::Additive => base + overlay,
            CostCombine::Multiplicative => base * overlay,
            CostCombine::Max => base.max(overlay),
        }
    }
}

/// One disjoint piece of a split cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReplacementPiece {
    pub aabb: Aabb,
    pub movement_cost_mult: f32,
    pub threat: f32,
}

#[derive(Clone, Copy)]
struct Piece {
    aabb: Aabb,
    cost: f32,
    threat: f32,
    blocked: bool,
}

/// Carve `cell_box` into disjoint pieces by successive 2D subtraction.
///
/// Pieces under a region take the combined cost and threat; pieces under a
/// blocker are removed. Pieces with area below `min_area` are dropped.
pub fn split_cell_by_regions(
    cell_box: &Aabb,
    base_cost: f32,
    base_threat: f32,
    regions: &[Region],
    policy: CostCombine,
    min_area: f32,
) -> Vec<ReplacementPiece> {
    let mut pieces = vec![Piece {
        aabb: *cell_box,
        cost: base_cost,
        threat: base_threat,
        blocked: false,
    }];

    for region in regions {
        let mut next = Vec::with_capacity(pieces.len() + 4);
        for piece in pieces {
            let Some(covered) = piece.aabb.clip_2d(&region.aabb) else {
                next.push(piece);
                continue;
            };

            for rest in piece.aabb.subtract_2d(&region.aabb) {
                next.push(Piece { aabb: rest, ..piece });
            }

            let blocked = piece.blocked || region.is_blocker();
            next.push(Piece {
                aabb: covered,
                cost: if blocked { piece.cost } else { policy.combine(piece.cost, region.movement_cost_mult) },
                threat: policy.combine(piece.threat, region.threat),
                blocked,
            });
        }
        pieces = next;
    }

    pieces
        .into_iter()
        .filter(|p| !p.blocked && p.aabb.area_2d() >= min_area)
        .map(|p| ReplacementPiece {
            aabb: p.aabb,
            movement_cost_mult: p.cost,
            threat: p.threat,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
        Aabb::from_coords(x0, y0, 0.0, x1, y1, 0.0)
    }

    #[test]
    fn test_combine_policies() {
        assert_relative_eq!(CostCombine::Additive.combine(1.0, 2.0), 3.0);
        assert_relative_eq!(CostCombine::Multiplicative.combine(1.5, 2.0), 3.0);
        assert_relative_eq!(CostCombine::Max.combine(1.0, 4.0), 4.0);
        assert_relative_eq!(CostCombine::Max.combine(5.0, 4.0), 5.0);
    }

    #[test]
    fn test_split_covers_cell_area() {
        let cell = square(0.0, 0.0, 10.0, 10.0);
        let region = Region::new(square(3.0, 3.0, 6.0, 6.0), 4.0, 2.0);
        let pieces = split_cell_by_regions(&cell, 1.0, 0.0, &[region], CostCombine::Max, 0.0);

        let total: f32 = pieces.iter().map(|p| p.aabb.area_2d()).sum();
        assert_relative_eq!(total, 100.0, epsilon = 1e-3);

        let covered: Vec<_> = pieces.iter().filter(|p| p.movement_cost_mult > 1.0).collect();
        assert_eq!(covered.len(), 1);
        assert_relative_eq!(covered[0].aabb.area_2d(), 9.0);
        assert_relative_eq!(covered[0].threat, 2.0);
    }

    #[test]
    fn test_blocker_removes_covered_piece() {
        let cell = square(0.0, 0.0, 10.0, 10.0);
        let pieces = split_cell_by_regions(
            &cell,
            1.0,
            0.0,
            &[Region::blocker(square(0.0, 0.0, 5.0, 10.0))],
            CostCombine::Max,
            0.0,
        );
        assert_eq!(pieces.len(), 1);
        assert!(pieces[0].aabb.approx_eq(&square(5.0, 0.0, 10.0, 10.0), 1e-5));
    }

    #[test]
    fn test_full_blocker_removes_everything() {
        let cell = square(0.0, 0.0, 10.0, 10.0);
        let pieces = split_cell_by_regions(
            &cell,
            1.0,
            0.0,
            &[Region::blocker(square(-1.0, -1.0, 11.0, 11.0))],
            CostCombine::Max,
            0.0,
        );
        assert!(pieces.is_empty());
    }

    #[test]
    fn test_overlapping_regions_stack() {
        let cell = square(0.0, 0.0, 10.0, 10.0);
        let regions = [
            Region::new(square(0.0, 0.0, 6.0, 10.0), 2.0, 1.0),
            Region::new(square(4.0, 0.0, 10.0, 10.0), 3.0, 1.0),
        ];
        let pieces = split_cell_by_regions(&cell, 1.0, 0.0, &regions, CostCombine::Additive, 0.0);
        let stacked: Vec<_> = pieces.iter().filter(|p| p.aabb.area_2d() > 0.0 && p.threat > 1.5).collect();
        assert_eq!(stacked.len(), 1);
        assert_relative_eq!(stacked[0].movement_cost_mult, 6.0);
        assert_relative_eq!(stacked[0].aabb.area_2d(), 20.0);
    }
}
