//! Random draws shared by the simulators.
//!
//! Everything here takes the caller's RNG so that a seeded simulator stays
//! reproducible end to end.

use std::f64::consts::PI;

use rand::Rng;

/// Uniform sample in `(0, 1)`, re-drawn while exactly zero.
fn nonzero_unit(rng: &mut impl Rng) -> f64 {
    loop {
        let u = rng.random::<f64>();
        if u != 0.0 {
            return u;
        }
    }
}

/// Standard normal sample (mean 0, stddev 1) via the Box-Muller transform.
///
/// Both uniforms are re-drawn while exactly zero so the logarithm is always
/// finite.
pub fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u = nonzero_unit(rng);
    let v = nonzero_unit(rng);
    (-2.0 * u.ln()).sqrt() * (2.0 * PI * v).cos()
}

/// Symmetric uniform step in `[-width/2, +width/2)`.
pub fn symmetric_step(rng: &mut impl Rng, width: f64) -> f64 {
    (rng.random::<f64>() - 0.5) * width
}

/// Pick the index of a bucket with probability proportional to its weight.
///
/// Returns `None` when every weight is zero.
pub fn weighted_index(rng: &mut impl Rng, weights: &[u32]) -> Option<usize> {
    let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    if total == 0 {
        return None;
    }
    let mut roll = rng.random_range(0..total);
    for (idx, &weight) in weights.iter().enumerate() {
        let weight = u64::from(weight);
        if roll < weight {
            return Some(idx);
        }
        roll -= weight;
    }
    // Unreachable while roll < total, kept as the last non-empty bucket.
    weights.iter().rposition(|&w| w > 0)
}
