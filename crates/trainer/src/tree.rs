//! Regression tree structures
//!
//! Trees are stored as flat node vectors (node 0 is the root). Internal nodes
//! send a row left when `feature <= threshold`; missing values (`NaN`) fail
//! the comparison and go right.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TrainerError};

/// A decision tree node (internal or leaf)
///
/// For internal nodes `feature_idx >= 0` and `left`/`right` index into the
/// node vector. Leaves have `feature_idx == -1` and carry `leaf`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub left: i32,
    pub right: i32,
    pub feature_idx: i32,
    pub threshold: f64,
    pub leaf: Option<f64>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(feature_idx: i32, threshold: f64, left: i32, right: i32) -> Self {
        Self {
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(value: f64) -> Self {
        Self {
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A single regression tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Evaluate this tree on a feature vector.
    ///
    /// A malformed tree (dangling child or feature index) evaluates to 0.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if let Some(value) = node.leaf {
                return value;
            }

            let Some(&value) = features.get(node.feature_idx as usize) else {
                return 0.0;
            };

            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            if next < 0 {
                return 0.0;
            }
            idx = next as usize;
        }
    }

    /// Check that every child index points forward into the node vector and
    /// that internal nodes name a feature.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(TrainerError::Estimator("tree has no nodes".to_string()));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                if node.leaf.is_none() {
                    return Err(TrainerError::Estimator(format!(
                        "leaf node {i} has no leaf value"
                    )));
                }
                continue;
            }
            for child in [node.left, node.right] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(TrainerError::Estimator(format!(
                        "node {i} has invalid child {child}"
                    )));
                }
            }
            if node.feature_idx < 0 {
                return Err(TrainerError::Estimator(format!(
                    "internal node {i} has invalid feature index {}",
                    node.feature_idx
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        // if feature[0] <= 50 then 1.5 else -0.5
        Tree::new(vec![
            Node::internal(0, 50.0, 1, 2),
            Node::leaf(1.5),
            Node::leaf(-0.5),
        ])
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[30.0]), 1.5);
        assert_eq!(tree.evaluate(&[50.0]), 1.5); // Equal goes left
        assert_eq!(tree.evaluate(&[60.0]), -0.5);
    }

    #[test]
    fn test_missing_value_goes_right() {
        assert_eq!(stump().evaluate(&[f64::NAN]), -0.5);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate().is_ok());

        let invalid = Tree::new(vec![
            Node::internal(0, 50.0, 5, 2), // left=5 is out of bounds
            Node::leaf(1.0),
            Node::leaf(2.0),
        ]);
        assert!(matches!(invalid.validate(), Err(TrainerError::Estimator(_))));
        assert!(Tree::default().validate().is_err());
    }
}
