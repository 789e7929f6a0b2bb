//! Threat tracking: active regions plus recently seen ones.

use std::time::{Duration, Instant};

use bhumi_mesh::{Aabb, Region, Vec3};

/// Nearest threatening point along the remaining path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThreatAhead {
    pub position: Vec3,
    pub threat: f32,
    /// Path distance from the agent
    pub distance: f32,
}

#[derive(Clone, Copy, Debug)]
struct SeenRegion {
    aabb: Aabb,
    threat: f32,
    last_seen: Instant,
}

/// Threat regions remembered for a cooldown after they disappear.
#[derive(Clone, Debug)]
pub struct ThreatTracker {
    cooldown: Duration,
    seen: Vec<SeenRegion>,
}

impl ThreatTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            seen: Vec::new(),
        }
    }

    /// Record the currently active regions and forget expired ones.
    pub fn refresh(&mut self, active: &[Region], now: Instant) {
        for region in active.iter().filter(|r| r.threat > 0.0) {
            match self.seen.iter_mut().find(|s| s.aabb == region.aabb) {
                Some(seen) => {
                    seen.threat = region.threat;
                    seen.last_seen = now;
                }
                None => self.seen.push(SeenRegion {
                    aabb: region.aabb,
                    threat: region.threat,
                    last_seen: now,
                }),
            }
        }

        let cooldown = self.cooldown;
        let before = self.seen.len();
        self.seen
            .retain(|s| now.saturating_duration_since(s.last_seen) <= cooldown);
        if self.seen.len() < before {
            tracing::debug!("Forgot {} expired threat regions", before - self.seen.len());
        }
    }

    /// Highest threat of the tracked regions containing `pos` (top-down).
    pub fn threat_at(&self, pos: Vec3) -> f32 {
        self.seen
            .iter()
            .filter(|s| s.aabb.contains_2d(pos))
            .map(|s| s.threat)
            .fold(0.0, f32::max)
    }

    /// Boxes of tracked regions whose threat is at least `threshold`.
    pub fn dangerous(&self, threshold: f32) -> Vec<Aabb> {
        self.seen
            .iter()
            .filter(|s| s.threat >= threshold)
            .map(|s| s.aabb)
            .collect()
    }

    /// First point within `range` along `pos -> points[0] -> ...` where the
    /// threat exceeds `threshold`.
    pub fn threat_ahead(&self, pos: Vec3, points: &[Vec3], range: f32, threshold: f32) -> Option<ThreatAhead> {
        let mut travelled = 0.0;
        let mut from = pos;

        for &to in points {
            let length = from.distance_2d(to);
            let mut best: Option<(f32, f32)> = None;
            for seen in self.seen.iter().filter(|s| s.threat > threshold) {
                let Some((t0, _)) = seen.aabb.segment_interval(from, to, false) else {
                    continue;
                };
                if best.is_none_or(|(bt, _)| t0 < bt) {
                    best = Some((t0, seen.threat));
                }
            }

            if let Some((t, threat)) = best {
                let distance = travelled + t * length;
                if distance > range {
                    return None;
                }
                return Some(ThreatAhead {
                    position: from.lerp(to, t),
                    threat,
                    distance,
                });
            }

            travelled += length;
            if travelled > range {
                return None;
            }
            from = to;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
        Aabb::from_coords(x0, y0, -1.0, x1, y1, 1.0)
    }

    #[test]
    fn test_cooldown_keeps_recent_regions() {
        let mut tracker = ThreatTracker::new(Duration::from_secs(3));
        let t0 = Instant::now();
        tracker.refresh(&[Region::new(square(0.0, 0.0, 4.0, 4.0), 1.0, 0.8)], t0);
        assert_eq!(tracker.threat_at(Vec3::new(2.0, 2.0, 0.0)), 0.8);

        // Region gone but still remembered
        tracker.refresh(&[], t0 + Duration::from_secs(2));
        assert_eq!(tracker.threat_at(Vec3::new(2.0, 2.0, 0.0)), 0.8);

        tracker.refresh(&[], t0 + Duration::from_secs(4));
        assert_eq!(tracker.threat_at(Vec3::new(2.0, 2.0, 0.0)), 0.0);
    }

    #[test]
    fn test_max_of_overlapping_regions() {
        let mut tracker = ThreatTracker::new(Duration::from_secs(1));
        let now = Instant::now();
        tracker.refresh(
            &[
                Region::new(square(0.0, 0.0, 4.0, 4.0), 1.0, 0.3),
                Region::new(square(2.0, 2.0, 6.0, 6.0), 1.0, 0.9),
                Region::new(square(0.0, 0.0, 9.0, 9.0), 2.0, 0.0),
            ],
            now,
        );
        assert_eq!(tracker.threat_at(Vec3::new(3.0, 3.0, 0.0)), 0.9);
        assert_eq!(tracker.threat_at(Vec3::new(1.0, 1.0, 0.0)), 0.3);
        assert_eq!(tracker.threat_at(Vec3::new(8.0, 8.0, 0.0)), 0.0);
        assert_eq!(tracker.dangerous(0.5).len(), 1);
    }

    #[test]
    fn test_threat_ahead_nearest_crossing() {
        let mut tracker = ThreatTracker::new(Duration::from_secs(1));
        let now = Instant::now();
        tracker.refresh(
            &[
                Region::new(square(6.0, -1.0, 8.0, 1.0), 1.0, 0.9),
                Region::new(square(12.0, -1.0, 14.0, 1.0), 1.0, 0.9),
            ],
            now,
        );

        let pos = Vec3::new(0.0, 0.0, 0.0);
        let points = [Vec3::new(10.0, 0.0, 0.0), Vec3::new(20.0, 0.0, 0.0)];
        let ahead = tracker.threat_ahead(pos, &points, 15.0, 0.5).unwrap();
        approx::assert_relative_eq!(ahead.distance, 6.0, epsilon = 1e-4);
        approx::assert_relative_eq!(ahead.position.x, 6.0, epsilon = 1e-4);

        // Out of range
        assert!(tracker.threat_ahead(pos, &points, 5.0, 0.5).is_none());
        // Below threshold
        assert!(tracker.threat_ahead(pos, &points, 15.0, 0.95).is_none());
    }
}
