//! CART (Classification and Regression Tree) builder
//!
//! Deterministic histogram-based greedy tree construction. Feature values are
//! bucketed once per fit into at most `max_bins` quantile bins; each node
//! accumulates gradient/hessian histograms per feature and scans the bin
//! boundaries for the best second-order gain.

use crate::dataset::FeatureMatrix;
use crate::deterministic::SplitTieBreaker;
use crate::tree::{Node, Tree};

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub reg_lambda: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_leaf: 32,
            reg_lambda: 0.0,
        }
    }
}

/// Per-feature split thresholds and the bin index of every training value.
///
/// For feature `f` with thresholds `t_0 < ... < t_{m-1}`, a value `v` falls in
/// the smallest bin `b` with `v <= t_b`, or bin `m` above every threshold.
/// Missing values use bin `m + 1`, which is always on the right of a split.
#[derive(Clone, Debug)]
pub struct BinnedFeatures {
    thresholds: Vec<Vec<f64>>,
    /// Column-major bin indices: `bins[feature][row]`
    bins: Vec<Vec<u16>>,
}

impl BinnedFeatures {
    /// Compute quantile thresholds and bin every row of `matrix`.
    pub fn fit(matrix: &FeatureMatrix, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, u16::MAX as usize - 2);
        let thresholds: Vec<Vec<f64>> = (0..matrix.feature_count())
            .map(|f| {
                let mut values: Vec<f64> = matrix
                    .rows
                    .iter()
                    .map(|row| row[f])
                    .filter(|v| !v.is_nan())
                    .collect();
                values.sort_by(f64::total_cmp);
                quantile_thresholds(&values, max_bins)
            })
            .collect();

        let bins = thresholds
            .iter()
            .enumerate()
            .map(|(f, cuts)| matrix.rows.iter().map(|row| bin_of(cuts, row[f])).collect())
            .collect();

        Self { thresholds, bins }
    }

    pub fn feature_count(&self) -> usize {
        self.thresholds.len()
    }
}

/// Midpoints between distinct values, merged so that each bin holds roughly
/// `len / max_bins` values. At most `max_bins - 1` thresholds.
fn quantile_thresholds(sorted: &[f64], max_bins: usize) -> Vec<f64> {
    let mut distinct: Vec<(f64, usize)> = Vec::new();
    for &v in sorted {
        match distinct.last_mut() {
            Some((last, count)) if *last == v => *count += 1,
            _ => distinct.push((v, 1)),
        }
    }
    if distinct.len() < 2 {
        return Vec::new();
    }

    let per_bin = (sorted.len() as f64 / max_bins as f64).max(1.0);
    let mut cuts = Vec::new();
    let mut filled = 0usize;
    for pair in distinct.windows(2) {
        let (value, count) = pair[0];
        filled += count;
        if filled as f64 >= per_bin || distinct.len() <= max_bins {
            cuts.push(value + (pair[1].0 - value) / 2.0);
            filled = 0;
            if cuts.len() == max_bins - 1 {
                break;
            }
        }
    }
    cuts
}

fn bin_of(cuts: &[f64], value: f64) -> u16 {
    if value.is_nan() {
        return (cuts.len() + 1) as u16;
    }
    cuts.partition_point(|&t| t < value) as u16
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    bin: usize,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, bin: usize, gain: f64) -> Self {
        Self {
            feature_idx,
            bin,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, bin),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

/// Build a regression tree on a subset of rows
pub struct CartBuilder<'a> {
    config: &'a TreeConfig,
    binned: &'a BinnedFeatures,
    gradients: &'a [f64],
    hessians: &'a [f64],
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        config: &'a TreeConfig,
        binned: &'a BinnedFeatures,
        gradients: &'a [f64],
        hessians: &'a [f64],
    ) -> Self {
        debug_assert_eq!(gradients.len(), hessians.len());

        Self {
            config,
            binned,
            gradients,
            hessians,
        }
    }

    /// Build tree from the given row indices
    pub fn build(&self, rows: &[usize]) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(rows, 0, &mut nodes);
        Tree::new(nodes)
    }

    /// Recursively build tree nodes, returning the index of the created node
    fn build_node(&self, rows: &[usize], depth: usize, nodes: &mut Vec<Node>) -> i32 {
        let current_idx = nodes.len();
        let (sum_g, sum_h) = self.sum_gradients_hessians(rows);
        let leaf_value = self.leaf_value(sum_g, sum_h);

        if depth >= self.config.max_depth || rows.len() < 2 * self.config.min_samples_leaf.max(1)
        {
            nodes.push(Node::leaf(leaf_value));
            return current_idx as i32;
        }

        let split = match self.find_best_split(rows, sum_g, sum_h) {
            Some(s) if s.gain > f64::EPSILON => s,
            _ => {
                nodes.push(Node::leaf(leaf_value));
                return current_idx as i32;
            }
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| usize::from(self.binned.bins[split.feature_idx][r]) <= split.bin);

        // Reserve space for current node
        let threshold = self.binned.thresholds[split.feature_idx][split.bin];
        nodes.push(Node::internal(split.feature_idx as i32, threshold, -1, -1));

        let left_idx = self.build_node(&left_rows, depth + 1, nodes);
        let right_idx = self.build_node(&right_rows, depth + 1, nodes);

        nodes[current_idx].left = left_idx;
        nodes[current_idx].right = right_idx;

        current_idx as i32
    }

    /// Scan every feature histogram for the best split
    fn find_best_split(&self, rows: &[usize], sum_g: f64, sum_h: f64) -> Option<SplitCandidate> {
        let min_leaf = self.config.min_samples_leaf.max(1);
        let parent_score = self.score(sum_g, sum_h);
        let mut best: Option<SplitCandidate> = None;

        for feature_idx in 0..self.binned.feature_count() {
            let cuts = self.binned.thresholds[feature_idx].len();
            if cuts == 0 {
                continue;
            }

            let mut hist_g = vec![0.0; cuts + 2];
            let mut hist_h = vec![0.0; cuts + 2];
            let mut hist_n = vec![0usize; cuts + 2];
            let column = &self.binned.bins[feature_idx];
            for &r in rows {
                let b = usize::from(column[r]);
                hist_g[b] += self.gradients[r];
                hist_h[b] += self.hessians[r];
                hist_n[b] += 1;
            }

            let (mut left_g, mut left_h, mut left_n) = (0.0, 0.0, 0usize);
            for bin in 0..cuts {
                left_g += hist_g[bin];
                left_h += hist_h[bin];
                left_n += hist_n[bin];

                let right_n = rows.len() - left_n;
                if left_n < min_leaf {
                    continue;
                }
                if right_n < min_leaf {
                    break;
                }

                let gain = self.score(left_g, left_h)
                    + self.score(sum_g - left_g, sum_h - left_h)
                    - parent_score;
                let candidate = SplitCandidate::new(feature_idx, bin, gain);

                if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    /// G² / (H + λ)
    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.config.reg_lambda;
        if denom > 0.0 {
            g * g / denom
        } else {
            0.0
        }
    }

    /// Sum gradients and hessians for a set of rows
    fn sum_gradients_hessians(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.gradients[r], h + self.hessians[r])
        })
    }

    /// Optimal leaf value: -G / (H + λ)
    fn leaf_value(&self, sum_g: f64, sum_h: f64) -> f64 {
        let denom = sum_h + self.config.reg_lambda;
        if denom > 0.0 {
            -sum_g / denom
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let names = (0..rows[0].len()).map(|i| format!("f{i}")).collect();
        FeatureMatrix::from_rows(names, rows).unwrap()
    }

    #[test]
    fn test_thresholds_are_midpoints() {
        let cuts = quantile_thresholds(&[1.0, 1.0, 2.0, 4.0], 255);
        assert_eq!(cuts, vec![1.5, 3.0]);
        assert!(quantile_thresholds(&[3.0, 3.0], 255).is_empty());
    }

    #[test]
    fn test_thresholds_respect_max_bins() {
        let values: Vec<f64> = (0..1000).map(f64::from).collect();
        let cuts = quantile_thresholds(&values, 10);
        assert!(cuts.len() <= 9);
        assert!(cuts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_bin_of_and_missing() {
        let cuts = [1.5, 3.0];
        assert_eq!(bin_of(&cuts, 1.0), 0);
        assert_eq!(bin_of(&cuts, 1.5), 0);
        assert_eq!(bin_of(&cuts, 2.0), 1);
        assert_eq!(bin_of(&cuts, 9.0), 2);
        assert_eq!(bin_of(&cuts, f64::NAN), 3);
    }

    #[test]
    fn test_simple_tree_separates_gradients() {
        let features = matrix(vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
        let gradients = vec![-1.0, -1.0, 1.0, 1.0];
        let hessians = vec![1.0; 4];
        let config = TreeConfig {
            max_depth: 2,
            min_samples_leaf: 1,
            reg_lambda: 0.0,
        };

        let binned = BinnedFeatures::fit(&features, 255);
        let tree = CartBuilder::new(&config, &binned, &gradients, &hessians).build(&[0, 1, 2, 3]);

        assert!(tree.validate().is_ok());
        assert_eq!(tree.nodes[0].threshold, 2.5);
        assert_eq!(tree.evaluate(&[1.0]), 1.0);
        assert_eq!(tree.evaluate(&[4.0]), -1.0);
    }

    #[test]
    fn test_leaf_only_tree() {
        let features = matrix(vec![vec![1.0]]);
        let binned = BinnedFeatures::fit(&features, 255);
        let config = TreeConfig::default();
        let tree = CartBuilder::new(&config, &binned, &[-2.0], &[1.0]).build(&[0]);

        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].leaf, Some(2.0));
    }

    #[test]
    fn test_min_samples_leaf_blocks_split() {
        let features = matrix(vec![vec![1.0], vec![2.0], vec![3.0]]);
        let binned = BinnedFeatures::fit(&features, 255);
        let config = TreeConfig {
            max_depth: 3,
            min_samples_leaf: 2,
            reg_lambda: 0.0,
        };
        let tree =
            CartBuilder::new(&config, &binned, &[-1.0, 0.0, 1.0], &[1.0; 3]).build(&[0, 1, 2]);
        assert_eq!(tree.nodes.len(), 1);
        assert!(tree.validate().is_ok());
    }
}
