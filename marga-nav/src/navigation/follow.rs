//! Path-follow policies.

use bhumi_mesh::{MovementFlags, Navmesh, Vec3};
use serde::{Deserialize, Serialize};

use super::destination::Destination;
use super::path::PathData;

/// How the agent consumes its path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathFollowStrategy {
    /// Advance through nodes; arrival within precision also needs a clear
    /// ray to the destination
    #[default]
    Default,
    /// Visit every path node in order
    Strict,
}

/// Result of one follow step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FollowStep {
    /// Move towards this point
    Moving(Vec3),
    /// Within arrival precision of the destination
    Arrived,
    /// Nothing to follow
    Idle,
}

impl PathFollowStrategy {
    /// Advance `path` for an agent at `pos` and pick the point to move to.
    pub fn step(
        self,
        path: &mut PathData,
        pos: Vec3,
        destination: &Destination,
        node_precision: f32,
        navmesh: &Navmesh,
    ) -> FollowStep {
        if destination.is_reached(pos) && self.arrived(path, pos, destination, node_precision, navmesh) {
            return FollowStep::Arrived;
        }
        if path.is_empty() {
            return FollowStep::Idle;
        }

        let last = path.points.len() - 1;
        while path.next_index < last && path.points[path.next_index].distance_2d(pos) <= node_precision {
            path.next_index += 1;
        }

        FollowStep::Moving(path.points[path.next_index])
    }

    /// Arrival check once the agent is within destination precision.
    fn arrived(
        self,
        path: &PathData,
        pos: Vec3,
        destination: &Destination,
        node_precision: f32,
        navmesh: &Navmesh,
    ) -> bool {
        match self {
            PathFollowStrategy::Strict => true,
            PathFollowStrategy::Default => {
                // End of the path counts even when the destination lies off the mesh
                let at_path_end = path
                    .points
                    .last()
                    .is_some_and(|p| path.next_index + 1 >= path.points.len() && p.distance_2d(pos) <= node_precision);
                at_path_end || navmesh.ray_cast_2d(pos, destination.position, MovementFlags::WALK).clear
            }
        }
    }
}
