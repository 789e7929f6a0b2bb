//! Destinations and their priority classes.

use bhumi_mesh::Vec3;
use serde::{Deserialize, Serialize};

/// Priority class of a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestType {
    Explore,
    Waypoint,
    Grid,
    User,
    Custom,
    BackTrack,
    RunAway,
}

impl DestType {
    /// Every kind in default priority order, lowest first.
    pub const ALL: [DestType; 7] = [
        DestType::Explore,
        DestType::Waypoint,
        DestType::Grid,
        DestType::User,
        DestType::Custom,
        DestType::BackTrack,
        DestType::RunAway,
    ];

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            DestType::Explore => 0,
            DestType::Waypoint => 1,
            DestType::Grid => 2,
            DestType::User => 3,
            DestType::Custom => 4,
            DestType::BackTrack => 5,
            DestType::RunAway => 6,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        DestType::ALL.get(v as usize).copied()
    }
}

/// What happens when the agent reaches a destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBehavior {
    /// Drop the destination
    #[default]
    Clear,
    /// Keep the destination active and hold position on it
    Hold,
}

/// Navigation goal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Destination {
    pub position: Vec3,
    /// Arrival radius
    pub precision: f32,
    pub kind: DestType,
    pub stop: StopBehavior,
    /// Caller data, e.g. the frontier cell an exploration destination targets
    pub tag: Option<u64>,
}

impl Destination {
    pub fn new(kind: DestType, position: Vec3, precision: f32) -> Self {
        Self {
            position,
            precision,
            kind,
            stop: StopBehavior::Clear,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: u64) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn holding(mut self) -> Self {
        self.stop = StopBehavior::Hold;
        self
    }

    /// Whether `p` is within arrival precision (top-down).
    #[inline]
    pub fn is_reached(&self, p: Vec3) -> bool {
        p.distance_2d(self.position) <= self.precision
    }
}

/// Rank of each kind, derived from the configured order.
///
/// RunAway always ranks above everything else.
#[derive(Clone, Debug)]
pub struct Priorities {
    order: Vec<DestType>,
}

impl Priorities {
    pub fn new(order: Vec<DestType>) -> Self {
        Self { order }
    }

    pub fn rank(&self, kind: DestType) -> usize {
        if kind == DestType::RunAway {
            return usize::MAX;
        }
        self.order.iter().position(|k| *k == kind).unwrap_or(0)
    }

    /// Whether a `request` may replace the `active` destination.
    pub fn allows(&self, active: DestType, request: DestType) -> bool {
        self.rank(request) >= self.rank(active)
    }
}

impl Default for Priorities {
    fn default() -> Self {
        Self::new(DestType::ALL.to_vec())
    }
}
