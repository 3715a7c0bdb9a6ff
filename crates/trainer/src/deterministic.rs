//! Deterministic utilities for reproducible training
//!
//! Provides an LCG-based RNG for row subsampling and the tie-breaking order
//! for split selection, so that identical inputs produce identical models.

use std::num::Wrapping;

/// Linear Congruential Generator for deterministic pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    // LCG constants (compatible with glibc)
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: i64) -> Self {
        Self {
            state: Wrapping(seed.wrapping_abs() % Self::MODULUS),
        }
    }

    /// Generate next random i64 in range [0, MODULUS)
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        self.state.0 & (Self::MODULUS - 1)
    }

    /// Choose `round(fraction * n)` distinct indices out of `0..n`, returned sorted.
    ///
    /// Partial Fisher-Yates over the index range; `fraction >= 1` keeps every row.
    pub fn sample_indices(&mut self, n: usize, fraction: f64) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if fraction >= 1.0 || n == 0 {
            return indices;
        }

        let take = ((n as f64 * fraction).round() as usize).clamp(1, n);
        for i in 0..take {
            let j = i + (self.next_i64() as usize) % (n - i);
            indices.swap(i, j);
        }
        indices.truncate(take);
        indices.sort_unstable();
        indices
    }
}

/// Deterministic tie-breaker for split selection
/// Lower `(feature_idx, threshold_rank)` wins when gains are equal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold_rank: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold_rank: usize) -> Self {
        Self {
            feature_idx,
            threshold_rank,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_sample_indices() {
        let mut rng = LcgRng::new(42);
        let sample = rng.sample_indices(100, 0.8);
        assert_eq!(sample.len(), 80);
        assert!(sample.windows(2).all(|w| w[0] < w[1]));
        assert!(sample.iter().all(|&i| i < 100));

        let mut again = LcgRng::new(42);
        assert_eq!(again.sample_indices(100, 0.8), sample);

        assert_eq!(rng.sample_indices(5, 1.0), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 3);
        let t2 = SplitTieBreaker::new(0, 4);
        let t3 = SplitTieBreaker::new(1, 0);

        assert!(t1 < t2);
        assert!(t2 < t3);
    }
}
