//! Seeded randomness for every stochastic step.
//!
//! Nothing in the engine touches a global generator. Callers pass a
//! [`RngSource`]; the seed it was built from travels with the outcome so a
//! battle can be replayed exactly.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::math::Fixed;

/// Deterministic pseudo-random source.
#[derive(Debug, Clone)]
pub struct RngSource {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RngSource {
    /// Create a source from a fixed seed.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Create a source from a fresh OS-provided seed.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::random())
    }

    /// Use the given seed, or draw one when absent.
    #[must_use]
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::from_seed)
    }

    /// Seed this source was created from.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Power multiplier in basis points, uniform within `±variance_pct`.
    pub fn variance_bp(&mut self, variance_pct: u32) -> u32 {
        let spread = variance_pct.min(99) * 100;
        self.rng.gen_range(10_000 - spread..=10_000 + spread)
    }

    /// Uniform fraction in `[0, 1)`.
    pub fn fraction(&mut self) -> Fixed {
        Fixed::from_bits(i64::from(self.rng.next_u32()))
    }

    /// `true` with the given probability. Zero never fires, one always does.
    pub fn chance(&mut self, probability: Fixed) -> bool {
        if probability <= Fixed::ZERO {
            return false;
        }
        self.fraction() < probability
    }

    /// `true` with the given probability in basis points.
    pub fn chance_bp(&mut self, bp: u32) -> bool {
        self.chance(crate::math::basis_points(bp))
    }

    /// Uniform integer in `lo..=hi`. Returns `lo` when the range is empty.
    pub fn range(&mut self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    /// Count how many of `trials` independent draws succeed.
    pub fn binomial_bp(&mut self, trials: u64, bp: u32) -> u64 {
        (0..trials).filter(|_| self.chance_bp(bp)).count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = RngSource::from_seed(42);
        let mut b = RngSource::from_seed(42);
        for _ in 0..100 {
            assert_eq!(a.variance_bp(10), b.variance_bp(10));
            assert_eq!(a.range(1, 1_000), b.range(1, 1_000));
        }
        assert_eq!(a.seed(), 42);
    }

    #[test]
    fn test_variance_stays_in_band() {
        let mut rng = RngSource::from_seed(7);
        for _ in 0..1_000 {
            let bp = rng.variance_bp(10);
            assert!((9_000..=11_000).contains(&bp));
        }
        assert_eq!(rng.variance_bp(0), 10_000);
    }

    #[test]
    fn test_chance_extremes() {
        let mut rng = RngSource::from_seed(3);
        for _ in 0..1_000 {
            assert!(!rng.chance(Fixed::ZERO));
            assert!(rng.chance(Fixed::ONE));
            assert!(rng.chance_bp(10_000));
        }
    }

    #[test]
    fn test_binomial_bounds() {
        let mut rng = RngSource::from_seed(11);
        assert_eq!(rng.binomial_bp(10, 0), 0);
        assert_eq!(rng.binomial_bp(10, 10_000), 10);
        assert!(rng.binomial_bp(10, 5_000) <= 10);
    }

    #[test]
    fn test_range_degenerate() {
        let mut rng = RngSource::from_seed(5);
        assert_eq!(rng.range(4, 4), 4);
        assert_eq!(rng.range(9, 2), 9);
    }
}
