//! Visiting-order heuristics for exploration targets.
//!
//! Both strategies optimise an open route that starts at a fixed node and
//! visits every target once, using distances from a [`DistanceCache`].
//! Neither is optimal; 2-opt is time boxed for use inside control loops,
//! annealing runs a fixed schedule for batch use.

use std::time::Instant;

use rand::Rng;

use super::distance_cache::DistanceCache;

/// Distance charged between nodes of different islands.
pub const UNREACHABLE_PENALTY: f32 = 1.0e6;

#[inline]
fn leg(cache: &DistanceCache, a: u32, b: u32) -> f32 {
    cache.distance(a, b).unwrap_or(UNREACHABLE_PENALTY)
}

/// Total length of `start -> order[0] -> ... -> order[n-1]`.
pub fn route_length(start: u32, order: &[u32], cache: &DistanceCache) -> f32 {
    let mut total = 0.0;
    let mut prev = start;
    for &next in order {
        total += leg(cache, prev, next);
        prev = next;
    }
    total
}

/// Length change of reversing `order[i..=j]`.
fn reversal_delta(start: u32, order: &[u32], i: usize, j: usize, cache: &DistanceCache) -> f32 {
    let prev = if i == 0 { start } else { order[i - 1] };
    let before = leg(cache, prev, order[i]);
    let after = leg(cache, prev, order[j]);
    match order.get(j + 1) {
        Some(&next) => after + leg(cache, order[i], next) - before - leg(cache, order[j], next),
        None => after - before,
    }
}

/// Greedy 2-opt descent from the seed order (normally breadth-first order).
///
/// Only improving reversals are applied, so the result is never longer than
/// the seed. Stops at a local optimum or at `deadline`.
pub fn order_two_opt(start: u32, seed: &[u32], cache: &DistanceCache, deadline: Instant) -> Vec<u32> {
    let mut order = seed.to_vec();
    let n = order.len();
    if n < 2 {
        return order;
    }

    let mut improved = true;
    while improved {
        improved = false;
        for i in 0..n - 1 {
            if Instant::now() >= deadline {
                tracing::debug!("2-opt stopped at deadline");
                return order;
            }
            for j in (i + 1)..n {
                if reversal_delta(start, &order, i, j, cache) < -1e-4 {
                    order[i..=j].reverse();
                    improved = true;
                }
            }
        }
    }
    order
}

/// Simulated annealing schedule.
#[derive(Clone, Copy, Debug)]
pub struct AnnealingParams {
    pub initial_temperature: f32,
    pub min_temperature: f32,
    /// Multiplier applied to the temperature after each round (0..1)
    pub cooling_rate: f32,
    pub moves_per_temperature: usize,
}

impl Default for AnnealingParams {
    fn default() -> Self {
        Self {
            initial_temperature: 100.0,
            min_temperature: 0.01,
            cooling_rate: 0.95,
            moves_per_temperature: 100,
        }
    }
}

/// Simulated annealing with random segment reversals.
///
/// Returns the best order seen, which is never longer than the seed.
pub fn order_simulated_annealing<R: Rng + ?Sized>(
    start: u32,
    seed: &[u32],
    cache: &DistanceCache,
    params: &AnnealingParams,
    rng: &mut R,
) -> Vec<u32> {
    let mut current = seed.to_vec();
    let n = current.len();
    if n < 2 {
        return current;
    }

    let mut current_len = route_length(start, &current, cache);
    let mut best = current.clone();
    let mut best_len = current_len;
    let cooling = params.cooling_rate.clamp(0.0, 0.9999);
    let mut temperature = params.initial_temperature;

    while temperature > params.min_temperature {
        for _ in 0..params.moves_per_temperature {
            let a = rng.random_range(0..n);
            let b = rng.random_range(0..n);
            if a == b {
                continue;
            }
            let (i, j) = if a < b { (a, b) } else { (b, a) };
            let delta = reversal_delta(start, &current, i, j, cache);
            let accept = delta < 0.0 || rng.random::<f32>() < (-delta / temperature).exp();
            if accept {
                current[i..=j].reverse();
                current_len += delta;
                if current_len < best_len - 1e-4 {
                    best_len = current_len;
                    best.clone_from(&current);
                }
            }
        }
        temperature *= cooling;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;

    /// Nodes 0..=6 on a line, unit spacing.
    fn line_cache() -> DistanceCache {
        let mut cache = DistanceCache::new();
        for i in 0..6 {
            cache.add_edge(i, i + 1, 1.0);
        }
        cache
    }

    #[test]
    fn test_two_opt_never_worse_than_seed() {
        let cache = line_cache();
        let seed = vec![4, 1, 6, 2, 5, 3];
        let ordered = order_two_opt(0, &seed, &cache, Instant::now() + Duration::from_secs(1));

        assert_eq!(ordered.len(), seed.len());
        assert!(route_length(0, &ordered, &cache) < route_length(0, &seed, &cache));
    }

    #[test]
    fn test_two_opt_expired_deadline_returns_seed() {
        let cache = line_cache();
        let seed = vec![4, 1, 6];
        assert_eq!(order_two_opt(0, &seed, &cache, Instant::now()), seed);
    }

    #[test]
    fn test_annealing_improves_route() {
        let cache = line_cache();
        let seed = vec![6, 1, 5, 2, 4, 3];
        let mut rng = StdRng::seed_from_u64(42);
        let ordered = order_simulated_annealing(0, &seed, &cache, &AnnealingParams::default(), &mut rng);

        let mut sorted = ordered.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5, 6]);
        assert!(route_length(0, &ordered, &cache) < route_length(0, &seed, &cache));
    }
}
