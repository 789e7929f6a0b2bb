//! Height plane used to align 2D points onto a cell's walkable surface.

use serde::{Deserialize, Serialize};

use super::vec3::Vec3;

/// Non-vertical plane expressed as a height function `z = a*x + b*y + c`.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Plane {
    /// Slope along x
    pub a: f32,
    /// Slope along y
    pub b: f32,
    /// Height at the origin
    pub c: f32,
}

impl Plane {
    /// Horizontal plane at height `z`.
    #[inline]
    pub fn horizontal(z: f32) -> Self {
        Self { a: 0.0, b: 0.0, c: z }
    }

    /// Plane through three points.
    ///
    /// Returns `None` for collinear points or a vertical plane.
    pub fn from_points(p0: Vec3, p1: Vec3, p2: Vec3) -> Option<Self> {
        let n = (p1 - p0).cross(p2 - p0);
        if n.z.abs() <= f32::EPSILON {
            return None;
        }
        // n.x*(x-x0) + n.y*(y-y0) + n.z*(z-z0) = 0
        let a = -n.x / n.z;
        let b = -n.y / n.z;
        let c = p0.z - a * p0.x - b * p0.y;
        Some(Self { a, b, c })
    }

    /// Height of the plane above (x, y).
    #[inline]
    pub fn height_at(&self, x: f32, y: f32) -> f32 {
        self.a * x + self.b * y + self.c
    }

    /// Vertical distance from the point to the plane.
    #[inline]
    pub fn vertical_distance(&self, p: Vec3) -> f32 {
        (p.z - self.height_at(p.x, p.y)).abs()
    }
}
