//! Geometry primitives: points, boxes and height planes.

mod aabb;
mod plane;
mod vec3;

pub use aabb::Aabb;
pub use plane::Plane;
pub use vec3::Vec3;
