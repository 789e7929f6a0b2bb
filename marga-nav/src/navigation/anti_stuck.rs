//! Anti-stuck escalation.
//!
//! The level rises with the time spent without measurable movement while a
//! destination is active:
//!
//! | Level | Effect |
//! |-------|--------|
//! | 1 | force a path recompute |
//! | 2 | bounce the search start sideways, randomise paths, recompute more often |
//! | 3 | stronger randomisation |
//!
//! Any movement, or standing on purpose, drops the level back to 0.

use std::time::{Duration, Instant};

use bhumi_mesh::Vec3;

use crate::config::AntiStuckConfig;

/// Escalation state snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AntiStuckStatus {
    pub level: u8,
    /// Search start is offset sideways
    pub bounce: bool,
    /// Path jitter applied to searches
    pub jitter: f32,
}

/// Escalation tracker, owned by the navigation tick.
#[derive(Clone, Debug)]
pub struct AntiStuck {
    config: AntiStuckConfig,
    level: u8,
    anchor: Option<Vec3>,
    still_since: Option<Instant>,
    standing_on_purpose: bool,
    bounce_side: f32,
}

impl AntiStuck {
    pub fn new(config: AntiStuckConfig) -> Self {
        Self {
            config,
            level: 0,
            anchor: None,
            still_since: None,
            standing_on_purpose: false,
            bounce_side: 1.0,
        }
    }

    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn status(&self) -> AntiStuckStatus {
        AntiStuckStatus {
            level: self.level,
            bounce: self.level >= 2,
            jitter: self.jitter(),
        }
    }

    pub fn set_standing_on_purpose(&mut self, standing: bool) {
        self.standing_on_purpose = standing;
        if standing {
            self.reset(None);
        }
    }

    fn reset(&mut self, anchor: Option<Vec3>) {
        self.level = 0;
        self.anchor = anchor;
        self.still_since = None;
    }

    /// Feed the agent position. Returns the new level when it rose.
    pub fn update(&mut self, pos: Vec3, has_destination: bool, now: Instant) -> Option<u8> {
        if self.standing_on_purpose || !has_destination {
            self.reset(Some(pos));
            return None;
        }

        let moved = self
            .anchor
            .is_none_or(|a| a.distance_2d(pos) >= self.config.movement_threshold);
        if moved {
            if self.level > 0 {
                tracing::info!("Agent moving again, anti-stuck level {} cleared", self.level);
            }
            self.reset(Some(pos));
            self.still_since = Some(now);
            return None;
        }

        let since = *self.still_since.get_or_insert(now);
        let still = now.saturating_duration_since(since).as_secs_f32();
        let level = if still >= self.config.level3_secs {
            3
        } else if still >= self.config.level2_secs {
            2
        } else if still >= self.config.level1_secs {
            1
        } else {
            0
        };

        if level > self.level {
            self.level = level;
            tracing::warn!("No movement for {:.1}s, anti-stuck level {}", still, level);
            return Some(level);
        }
        None
    }

    /// Path jitter for the current level.
    pub fn jitter(&self) -> f32 {
        match self.level {
            0 | 1 => 0.0,
            2 => self.config.level2_jitter,
            _ => self.config.level3_jitter,
        }
    }

    /// Recompute interval for the current level.
    pub fn recalc_interval(&self, base: Duration) -> Duration {
        if self.level >= 2 {
            base.min(Duration::from_millis(self.config.escalated_recalc_interval_ms))
        } else {
            base
        }
    }

    /// Search start for the current level: shifted sideways relative to the
    /// heading `from -> towards` at level 2 and above, alternating sides.
    pub fn search_start(&mut self, from: Vec3, towards: Vec3) -> Vec3 {
        if self.level < 2 {
            return from;
        }
        let heading = (towards - from).with_z(0.0);
        if heading.length_2d() <= f32::EPSILON {
            return from;
        }
        let side = heading.normalized_2d().perpendicular_2d() * (self.config.bounce_distance * self.bounce_side);
        self.bounce_side = -self.bounce_side;
        from + side
    }
}
