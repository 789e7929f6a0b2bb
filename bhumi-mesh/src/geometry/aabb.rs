//! Axis-aligned box used for cells, grid cells, regions and frontier tiles.
//!
//! Most navigation queries treat boxes in 2D (top-down) with the z range only
//! used to decide whether two boxes are vertically reachable from each other.

use serde::{Deserialize, Serialize};

use super::vec3::Vec3;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a box from two corners, in any order.
    #[inline]
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create a box from raw coordinates.
    #[inline]
    pub fn from_coords(min_x: f32, min_y: f32, min_z: f32, max_x: f32, max_y: f32, max_z: f32) -> Self {
        Self::new(
            Vec3::new(min_x, min_y, min_z),
            Vec3::new(max_x, max_y, max_z),
        )
    }

    /// Box centred on `center` with half-sizes `half`.
    #[inline]
    pub fn from_center(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half, center + half)
    }

    /// Centre of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Size along each axis.
    #[inline]
    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    /// Top-down area.
    #[inline]
    pub fn area_2d(&self) -> f32 {
        let d = self.dimensions();
        d.x * d.y
    }

    /// Largest horizontal dimension.
    #[inline]
    pub fn max_dimension_2d(&self) -> f32 {
        let d = self.dimensions();
        d.x.max(d.y)
    }

    /// Whether the point lies inside (inclusive).
    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        self.contains_tol(p, 0.0, 0.0)
    }

    /// Whether the point lies inside with horizontal and vertical tolerances.
    #[inline]
    pub fn contains_tol(&self, p: Vec3, tol: f32, z_tol: f32) -> bool {
        p.x >= self.min.x - tol
            && p.x <= self.max.x + tol
            && p.y >= self.min.y - tol
            && p.y <= self.max.y + tol
            && p.z >= self.min.z - z_tol
            && p.z <= self.max.z + z_tol
    }

    /// Whether the point's projection lies inside (inclusive).
    #[inline]
    pub fn contains_2d(&self, p: Vec3) -> bool {
        self.contains_2d_tol(p, 0.0)
    }

    /// Whether the point's projection lies inside, grown by `tol`.
    #[inline]
    pub fn contains_2d_tol(&self, p: Vec3, tol: f32) -> bool {
        p.x >= self.min.x - tol
            && p.x <= self.max.x + tol
            && p.y >= self.min.y - tol
            && p.y <= self.max.y + tol
    }

    /// Whether `other` lies completely inside this box.
    #[inline]
    pub fn contains_box(&self, other: &Aabb) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// Top-down overlap test, touching edges count when `tol >= 0`.
    #[inline]
    pub fn intersects_2d(&self, other: &Aabb, tol: f32) -> bool {
        self.min.x <= other.max.x + tol
            && self.max.x >= other.min.x - tol
            && self.min.y <= other.max.y + tol
            && self.max.y >= other.min.y - tol
    }

    /// Full 3D overlap test, touching faces count.
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.intersects_2d(other, 0.0)
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Top-down overlap with strictly positive area.
    #[inline]
    pub fn overlaps_area_2d(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Vertical gap between the z ranges (0 when they overlap).
    #[inline]
    pub fn vertical_gap(&self, other: &Aabb) -> f32 {
        (other.min.z - self.max.z).max(self.min.z - other.max.z).max(0.0)
    }

    /// 3D intersection, `None` when disjoint.
    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        if !self.intersects(other) {
            return None;
        }
        Some(Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    /// 2D-tolerant intersection used for neighbour borders.
    ///
    /// Horizontal ranges must overlap or touch (within `tol`), and the shared
    /// border must be longer than `tol` on at least one axis, so boxes meeting
    /// only at a corner have no border. The z range of the result spans the
    /// overlap of both z ranges, or the gap between them when they do not
    /// overlap, so the centre is always a sensible border point.
    pub fn intersection_2d_tolerant(&self, other: &Aabb, tol: f32) -> Option<Aabb> {
        if !self.intersects_2d(other, tol) {
            return None;
        }
        let overlap_x = self.max.x.min(other.max.x) - self.min.x.max(other.min.x);
        let overlap_y = self.max.y.min(other.max.y) - self.min.y.max(other.min.y);
        if overlap_x.max(overlap_y) <= tol.max(0.0) {
            return None;
        }

        let (min_x, max_x) = sorted(self.min.x.max(other.min.x), self.max.x.min(other.max.x));
        let (min_y, max_y) = sorted(self.min.y.max(other.min.y), self.max.y.min(other.max.y));
        let (min_z, max_z) = sorted(self.min.z.max(other.min.z), self.max.z.min(other.max.z));

        Some(Aabb::from_coords(min_x, min_y, min_z, max_x, max_y, max_z))
    }

    /// Top-down subtraction `self - other`.
    ///
    /// Returns the disjoint remainder pieces (at most four), keeping this box's
    /// z range. When the boxes do not overlap with positive area the result is
    /// this box unchanged.
    pub fn subtract_2d(&self, other: &Aabb) -> Vec<Aabb> {
        if !self.overlaps_area_2d(other) {
            return vec![*self];
        }

        let mut pieces = Vec::with_capacity(4);
        let (z0, z1) = (self.min.z, self.max.z);

        // Full-height strips left and right of the cut
        if other.min.x > self.min.x {
            pieces.push(Aabb::from_coords(self.min.x, self.min.y, z0, other.min.x, self.max.y, z1));
        }
        if other.max.x < self.max.x {
            pieces.push(Aabb::from_coords(other.max.x, self.min.y, z0, self.max.x, self.max.y, z1));
        }

        // Middle column above and below the cut
        let mid_min_x = self.min.x.max(other.min.x);
        let mid_max_x = self.max.x.min(other.max.x);
        if other.min.y > self.min.y {
            pieces.push(Aabb::from_coords(mid_min_x, self.min.y, z0, mid_max_x, other.min.y, z1));
        }
        if other.max.y < self.max.y {
            pieces.push(Aabb::from_coords(mid_min_x, other.max.y, z0, mid_max_x, self.max.y, z1));
        }

        pieces
    }

    /// Top-down overlap of `self` and `other` with this box's z range.
    pub fn clip_2d(&self, other: &Aabb) -> Option<Aabb> {
        if !self.overlaps_area_2d(other) {
            return None;
        }
        Some(Aabb::from_coords(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.min.z,
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
            self.max.z,
        ))
    }

    /// Closest point inside the box.
    #[inline]
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        Vec3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }

    /// Distance from the point to the box (0 inside).
    #[inline]
    pub fn distance(&self, p: Vec3) -> f32 {
        self.closest_point(p).distance(p)
    }

    /// Top-down distance from the point to the box (0 inside).
    #[inline]
    pub fn distance_2d(&self, p: Vec3) -> f32 {
        self.closest_point(p).distance_2d(p)
    }

    /// Parametric interval `[t_enter, t_exit]` of the segment `a -> b` inside the box.
    ///
    /// `t` is clamped to `[0, 1]`. Axes where the segment does not move only
    /// accept the segment when it lies within that slab (so rays tangent to a
    /// face are inside). With `use_z == false` the z slab is ignored.
    pub fn segment_interval(&self, a: Vec3, b: Vec3, use_z: bool) -> Option<(f32, f32)> {
        let d = b - a;
        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;

        let axes: &[(f32, f32, f32, f32)] = &[
            (a.x, d.x, self.min.x, self.max.x),
            (a.y, d.y, self.min.y, self.max.y),
            (a.z, d.z, self.min.z, self.max.z),
        ];
        let count = if use_z { 3 } else { 2 };

        for &(origin, dir, lo, hi) in &axes[..count] {
            if dir.abs() <= f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let (near, far) = sorted((lo - origin) * inv, (hi - origin) * inv);
            t0 = t0.max(near);
            t1 = t1.min(far);
            if t0 > t1 {
                return None;
            }
        }

        Some((t0, t1))
    }

    /// Smallest box containing both.
    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Box grown by `margin` horizontally and `z_margin` vertically.
    #[inline]
    pub fn expanded(&self, margin: f32, z_margin: f32) -> Aabb {
        let grow = Vec3::new(margin, margin, z_margin);
        Aabb {
            min: self.min - grow,
            max: self.max + grow,
        }
    }

    /// Component-wise comparison with tolerance.
    #[inline]
    pub fn approx_eq(&self, other: &Aabb, eps: f32) -> bool {
        (self.min - other.min).length() <= eps && (self.max - other.max).length() <= eps
    }

    /// Corners of the top face projected at `z`, counter-clockwise.
    pub fn corners_2d(&self, z: f32) -> [Vec3; 4] {
        [
            Vec3::new(self.min.x, self.min.y, z),
            Vec3::new(self.max.x, self.min.y, z),
            Vec3::new(self.max.x, self.max.y, z),
            Vec3::new(self.min.x, self.max.y, z),
        ]
    }
}

#[inline]
fn sorted(a: f32, b: f32) -> (f32, f32) {
    if a <= b { (a, b) } else { (b, a) }
}

impl std::fmt::Display for Aabb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} - {}]", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
        Aabb::from_coords(x0, y0, 0.0, x1, y1, 1.0)
    }

    #[test]
    fn test_touching_boxes_intersect_2d() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        let b = square(10.0, 0.0, 20.0, 10.0);
        assert!(a.intersects_2d(&b, 0.0));
        assert!(!a.overlaps_area_2d(&b));

        let border = a.intersection_2d_tolerant(&b, 0.0).unwrap();
        assert_relative_eq!(border.center().x, 10.0);
        assert_relative_eq!(border.center().y, 5.0);
    }

    #[test]
    fn test_disjoint_boxes_have_no_border() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        let b = square(10.5, 0.0, 20.0, 10.0);
        assert!(a.intersection_2d_tolerant(&b, 0.0).is_none());
        assert!(a.intersection_2d_tolerant(&b, 1.0).is_some());
    }

    #[test]
    fn test_corner_contact_has_no_border() {
        let a = square(10.0, 0.0, 20.0, 10.0);
        let b = square(20.0, 10.0, 30.0, 20.0);
        assert!(a.intersects_2d(&b, 0.01));
        assert!(a.intersection_2d_tolerant(&b, 0.0).is_none());
        assert!(a.intersection_2d_tolerant(&b, 0.01).is_none());

        // Near-corner gap inside the tolerance is still a corner
        let c = square(20.005, 10.005, 30.0, 20.0);
        assert!(a.intersection_2d_tolerant(&c, 0.01).is_none());
    }

    #[test]
    fn test_subtract_center_hole() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        let hole = square(4.0, 4.0, 6.0, 6.0);
        let pieces = a.subtract_2d(&hole);
        assert_eq!(pieces.len(), 4);

        let area: f32 = pieces.iter().map(|p| p.area_2d()).sum();
        assert_relative_eq!(area, 100.0 - 4.0, epsilon = 1e-4);

        for (i, p) in pieces.iter().enumerate() {
            assert!(!p.overlaps_area_2d(&hole));
            for q in pieces.iter().skip(i + 1) {
                assert!(!p.overlaps_area_2d(q));
            }
        }
    }

    #[test]
    fn test_subtract_covering_box_leaves_nothing() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        let cover = square(-1.0, -1.0, 11.0, 11.0);
        assert!(a.subtract_2d(&cover).is_empty());
    }

    #[test]
    fn test_subtract_edge_strip() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        let cut = square(-5.0, -5.0, 5.0, 15.0);
        let pieces = a.subtract_2d(&cut);
        assert_eq!(pieces.len(), 1);
        assert_relative_eq!(pieces[0].min.x, 5.0);
        assert_relative_eq!(pieces[0].max.x, 10.0);
    }

    #[test]
    fn test_segment_interval_tangent() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        // Ray along the bottom face
        let hit = a.segment_interval(Vec3::new(-5.0, 0.0, 0.5), Vec3::new(15.0, 0.0, 0.5), false);
        let (t0, t1) = hit.unwrap();
        assert_relative_eq!(t0, 0.25);
        assert_relative_eq!(t1, 0.75);

        // Parallel ray outside the box
        assert!(
            a.segment_interval(Vec3::new(-5.0, -1.0, 0.5), Vec3::new(15.0, -1.0, 0.5), false)
                .is_none()
        );
    }

    #[test]
    fn test_distance_2d() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        assert_relative_eq!(a.distance_2d(Vec3::new(13.0, 14.0, 50.0)), 5.0);
        assert_relative_eq!(a.distance_2d(Vec3::new(5.0, 5.0, 50.0)), 0.0);
    }
}
