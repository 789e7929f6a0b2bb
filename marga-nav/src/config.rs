//! Configuration loading for MargaNav
//!
//! One TOML file with a section per subsystem. Every field has a default, so
//! an empty file is a valid configuration.

use std::path::Path;

use bhumi_mesh::NavmeshConfig;
use serde::{Deserialize, Serialize};

use crate::error::{MargaError, Result};
use crate::exploration::ExploreStrategy;
use crate::navigation::{DestType, PathFollowStrategy};

/// Main configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MargaConfig {
    #[serde(default)]
    pub navmesh: NavmeshConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub anti_stuck: AntiStuckConfig,
    #[serde(default)]
    pub threat: ThreatConfig,
    #[serde(default)]
    pub exploration: ExplorationConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Path maintenance and following
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Navigation loop interval (milliseconds)
    #[serde(default = "default_nav_interval_ms")]
    pub update_interval_ms: u64,

    /// Destination kinds from lowest to highest priority
    #[serde(default = "default_priorities")]
    pub priorities: Vec<DestType>,

    /// Regular path recomputation interval (milliseconds)
    #[serde(default = "default_path_recalc_interval_ms")]
    pub path_recalc_interval_ms: u64,

    /// A* time budget per search (milliseconds)
    #[serde(default = "default_search_budget_ms")]
    pub search_time_budget_ms: u64,

    /// Radius within which a path node counts as reached
    #[serde(default = "default_node_precision")]
    pub node_precision: f32,

    /// Arrival precision of user destinations
    #[serde(default = "default_destination_precision")]
    pub destination_precision: f32,

    /// Path follow policy
    #[serde(default)]
    pub follow_strategy: PathFollowStrategy,

    /// Paths with more nodes are truncated into a rough path
    #[serde(default = "default_rough_path_max_nodes")]
    pub rough_path_max_nodes: usize,

    /// Distance to the last kept rough-path waypoint that triggers a recompute
    #[serde(default = "default_rough_trigger_radius")]
    pub rough_trigger_radius: f32,

    /// Tolerance used to locate the agent on the mesh
    #[serde(default = "default_position_tolerance")]
    pub position_tolerance: f32,

    /// Minimum spacing between recorded history positions
    #[serde(default = "default_history_spacing")]
    pub history_spacing: f32,

    /// Maximum number of recorded history positions
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Seed of the path jitter generator
    #[serde(default)]
    pub rng_seed: u64,
}

/// Anti-stuck escalation thresholds
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AntiStuckConfig {
    /// Displacement that counts as movement
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f32,

    /// Seconds without movement before level 1 (forced recompute)
    #[serde(default = "default_level1_secs")]
    pub level1_secs: f32,

    /// Seconds without movement before level 2 (bounce and randomisation)
    #[serde(default = "default_level2_secs")]
    pub level2_secs: f32,

    /// Seconds without movement before level 3 (more randomisation)
    #[serde(default = "default_level3_secs")]
    pub level3_secs: f32,

    /// Lateral offset of the search start at level 2 and above
    #[serde(default = "default_bounce_distance")]
    pub bounce_distance: f32,

    /// Path jitter at level 2
    #[serde(default = "default_level2_jitter")]
    pub level2_jitter: f32,

    /// Path jitter at level 3
    #[serde(default = "default_level3_jitter")]
    pub level3_jitter: f32,

    /// Recompute interval while escalated (milliseconds)
    #[serde(default = "default_escalated_recalc_ms")]
    pub escalated_recalc_interval_ms: u64,
}

/// Threat avoidance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreatConfig {
    /// Threat above this value triggers RunAway
    #[serde(default = "default_threat_threshold")]
    pub threshold: f32,

    /// How far along the path threats are reported
    #[serde(default = "default_detection_range")]
    pub detection_range: f32,

    /// Regions seen within this window still count (milliseconds)
    #[serde(default = "default_threat_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Arrival precision of RunAway destinations
    #[serde(default = "default_escape_precision")]
    pub escape_precision: f32,
}

/// Frontier exploration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExplorationConfig {
    /// Exploration loop interval (milliseconds)
    #[serde(default = "default_explore_interval_ms")]
    pub update_interval_ms: u64,

    /// Side of the square frontier lattice
    #[serde(default = "default_explore_cell_size")]
    pub explore_cell_size: f32,

    /// Frontier cells with less discovered area are small
    #[serde(default = "default_min_area")]
    pub min_area: f32,

    /// Frontier cells whose largest side is shorter are small
    #[serde(default = "default_min_dimension")]
    pub min_dimension: f32,

    /// Frontier cells whose centre is this close to the agent become explored
    #[serde(default = "default_explore_radius")]
    pub explore_radius: f32,

    /// Whether small frontier cells are exploration targets
    #[serde(default)]
    pub explore_small: bool,

    /// Weight of the explored-neighbour fraction in the selection score
    #[serde(default = "default_neighbour_reward")]
    pub neighbour_reward: f32,

    /// Target ordering strategy
    #[serde(default)]
    pub strategy: ExploreStrategy,

    /// Time budget of the 2-opt ordering (milliseconds)
    #[serde(default = "default_route_budget_ms")]
    pub route_time_budget_ms: u64,

    /// Arrival precision of exploration destinations
    #[serde(default = "default_destination_precision")]
    pub destination_precision: f32,

    /// Timed-out searches in a row that count as one unreachable verdict
    #[serde(default = "default_max_search_timeouts")]
    pub max_search_timeouts: u32,

    /// Seed of the annealing generator
    #[serde(default)]
    pub rng_seed: u64,
}

/// Agent simulation run by the binary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulation step (milliseconds)
    #[serde(default = "default_sim_tick_ms")]
    pub tick_ms: u64,

    /// Agent speed (units per second)
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Agent start position
    #[serde(default)]
    pub start: [f32; 3],

    /// Status log interval (seconds)
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: f32,

    /// Join timeout of the background loops (milliseconds)
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_nav_interval_ms(),
            priorities: default_priorities(),
            path_recalc_interval_ms: default_path_recalc_interval_ms(),
            search_time_budget_ms: default_search_budget_ms(),
            node_precision: default_node_precision(),
            destination_precision: default_destination_precision(),
            follow_strategy: PathFollowStrategy::default(),
            rough_path_max_nodes: default_rough_path_max_nodes(),
            rough_trigger_radius: default_rough_trigger_radius(),
            position_tolerance: default_position_tolerance(),
            history_spacing: default_history_spacing(),
            max_history: default_max_history(),
            rng_seed: 0,
        }
    }
}

impl Default for AntiStuckConfig {
    fn default() -> Self {
        Self {
            movement_threshold: default_movement_threshold(),
            level1_secs: default_level1_secs(),
            level2_secs: default_level2_secs(),
            level3_secs: default_level3_secs(),
            bounce_distance: default_bounce_distance(),
            level2_jitter: default_level2_jitter(),
            level3_jitter: default_level3_jitter(),
            escalated_recalc_interval_ms: default_escalated_recalc_ms(),
        }
    }
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            threshold: default_threat_threshold(),
            detection_range: default_detection_range(),
            cooldown_ms: default_threat_cooldown_ms(),
            escape_precision: default_escape_precision(),
        }
    }
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_explore_interval_ms(),
            explore_cell_size: default_explore_cell_size(),
            min_area: default_min_area(),
            min_dimension: default_min_dimension(),
            explore_radius: default_explore_radius(),
            explore_small: false,
            neighbour_reward: default_neighbour_reward(),
            strategy: ExploreStrategy::default(),
            route_time_budget_ms: default_route_budget_ms(),
            destination_precision: default_destination_precision(),
            max_search_timeouts: default_max_search_timeouts(),
            rng_seed: 0,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_sim_tick_ms(),
            speed: default_speed(),
            start: [0.0; 3],
            status_interval_secs: default_status_interval(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

// Navigation defaults
fn default_nav_interval_ms() -> u64 {
    50
}
fn default_priorities() -> Vec<DestType> {
    DestType::ALL.to_vec()
}
fn default_path_recalc_interval_ms() -> u64 {
    2000
}
fn default_search_budget_ms() -> u64 {
    50
}
fn default_node_precision() -> f32 {
    0.5
}
fn default_destination_precision() -> f32 {
    0.5
}
fn default_rough_path_max_nodes() -> usize {
    32
}
fn default_rough_trigger_radius() -> f32 {
    3.0
}
fn default_position_tolerance() -> f32 {
    2.0
}
fn default_history_spacing() -> f32 {
    1.0
}
fn default_max_history() -> usize {
    256
}

// Anti-stuck defaults
fn default_movement_threshold() -> f32 {
    0.2
}
fn default_level1_secs() -> f32 {
    2.0
}
fn default_level2_secs() -> f32 {
    4.0
}
fn default_level3_secs() -> f32 {
    8.0
}
fn default_bounce_distance() -> f32 {
    1.0
}
fn default_level2_jitter() -> f32 {
    0.3
}
fn default_level3_jitter() -> f32 {
    1.0
}
fn default_escalated_recalc_ms() -> u64 {
    500
}

// Threat defaults
fn default_threat_threshold() -> f32 {
    0.5
}
fn default_detection_range() -> f32 {
    10.0
}
fn default_threat_cooldown_ms() -> u64 {
    3000
}
fn default_escape_precision() -> f32 {
    1.0
}

// Exploration defaults
fn default_explore_interval_ms() -> u64 {
    100
}
fn default_explore_cell_size() -> f32 {
    10.0
}
fn default_min_area() -> f32 {
    1.0
}
fn default_min_dimension() -> f32 {
    0.5
}
fn default_explore_radius() -> f32 {
    2.0
}
fn default_neighbour_reward() -> f32 {
    5.0
}
fn default_route_budget_ms() -> u64 {
    20
}
fn default_max_search_timeouts() -> u32 {
    3
}

// Simulation defaults
fn default_sim_tick_ms() -> u64 {
    50
}
fn default_speed() -> f32 {
    5.0
}
fn default_status_interval() -> f32 {
    2.0
}
fn default_stop_timeout_ms() -> u64 {
    2000
}

impl MargaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MargaError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: MargaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for kind in DestType::ALL {
            let count = self.navigation.priorities.iter().filter(|k| **k == kind).count();
            if count != 1 {
                return Err(MargaError::Config(format!(
                    "navigation.priorities must list {:?} exactly once (found {})",
                    kind, count
                )));
            }
        }

        let s = &self.anti_stuck;
        if !(s.level1_secs <= s.level2_secs && s.level2_secs <= s.level3_secs) {
            return Err(MargaError::Config(
                "anti_stuck level thresholds must be non-decreasing".to_string(),
            ));
        }

        if self.exploration.explore_cell_size <= 0.0 {
            return Err(MargaError::Config("exploration.explore_cell_size must be positive".to_string()));
        }
        Ok(())
    }
}
