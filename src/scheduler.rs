//! Build-cycle recall-window scheduler (C4): samples `N` past timestamps
//! from a two-component (bimodal) Gaussian mixture over hours-before-now,
//! the way a spaced, recency-biased-but-long-tailed sampling policy is
//! usually expressed. RNG is injected (`&mut impl rand::Rng`) rather than
//! drawn from a thread-local generator so callers can get fully
//! deterministic output in tests.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::config::BuildDistribution;
use crate::graph::now_secs;

/// Draws one timestamp (Unix seconds, fractional) from the bimodal-Gaussian
/// recall-window distribution, never later than `now`.
pub fn sample_timestamp(now: f64, dist: &BuildDistribution, rng: &mut impl Rng) -> f64 {
    let total_weight = dist.weight1 + dist.weight2;
    let p1 = if total_weight > 0.0 {
        dist.weight1 / total_weight
    } else {
        1.0
    };
    let use_first = rng.random::<f64>() < p1;
    let (mu, sigma) = if use_first {
        (dist.mu1_hours, dist.sigma1_hours)
    } else {
        (dist.mu2_hours, dist.sigma2_hours)
    };
    let hours = if sigma <= 0.0 {
        mu
    } else {
        Normal::new(mu, sigma)
            .map(|normal| normal.sample(rng))
            .unwrap_or(mu)
    };
    (now - hours.max(0.0) * 3600.0).max(0.0)
}

/// Draws `n` timestamps for one build cycle.
pub fn sample_timestamps(now: f64, n: usize, dist: &BuildDistribution, rng: &mut impl Rng) -> Vec<f64> {
    (0..n).map(|_| sample_timestamp(now, dist, rng)).collect()
}

/// Convenience wrapper that samples against the real wall clock.
pub fn sample_timestamps_now(n: usize, dist: &BuildDistribution, rng: &mut impl Rng) -> Vec<f64> {
    sample_timestamps(now_secs(), n, dist, rng)
}
