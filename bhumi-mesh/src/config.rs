//! Navmesh configuration.
//!
//! Loaded as the `[navmesh]` section of the application config, or on its own
//! from a TOML file:
//!
//! ```toml
//! update_interval_ms = 25
//! cost_combine = "max"
//! border_tolerance = 0.01
//! max_step_height = 2.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cell::ConnectParams;
use crate::error::{NavmeshError, Result};
use crate::flags::MovementFlags;
use crate::region::CostCombine;

/// Navmesh settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NavmeshConfig {
    /// Background overlay/patch loop interval (milliseconds)
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// How region cost and threat combine with the covered cell's values
    #[serde(default)]
    pub cost_combine: CostCombine,

    /// Movement flags the connectivity patches are built for
    #[serde(default = "default_patch_flags")]
    pub patch_flags: u8,

    /// Horizontal slack when deciding whether two boxes touch
    #[serde(default = "default_border_tolerance")]
    pub border_tolerance: f32,

    /// Largest vertical gap between two boxes that still connects them
    #[serde(default = "default_max_step_height")]
    pub max_step_height: f32,

    /// Replacement pieces smaller than this area are dropped
    #[serde(default = "default_min_replacement_area")]
    pub min_replacement_area: f32,

    /// Default tolerance used by point lookups when no cell contains the point
    #[serde(default = "default_nearest_tolerance")]
    pub nearest_tolerance: f32,
}

impl Default for NavmeshConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            cost_combine: CostCombine::default(),
            patch_flags: default_patch_flags(),
            border_tolerance: default_border_tolerance(),
            max_step_height: default_max_step_height(),
            min_replacement_area: default_min_replacement_area(),
            nearest_tolerance: default_nearest_tolerance(),
        }
    }
}

fn default_update_interval_ms() -> u64 {
    25
}
fn default_patch_flags() -> u8 {
    MovementFlags::WALK.bits()
}
fn default_border_tolerance() -> f32 {
    0.01
}
fn default_max_step_height() -> f32 {
    2.0
}
fn default_min_replacement_area() -> f32 {
    0.01
}
fn default_nearest_tolerance() -> f32 {
    1.0
}

impl NavmeshConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NavmeshError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Movement flags of the connectivity patches.
    pub fn patch_flags(&self) -> MovementFlags {
        MovementFlags(self.patch_flags)
    }

    /// Geometric parameters used when wiring cells together.
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            tolerance: self.border_tolerance,
            max_step_height: self.max_step_height,
        }
    }
}
