//! Fold partitioning for cross-validation

use crate::errors::{Result, TrainerError};

/// One fold: rows to fit on and rows to validate on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub fit: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Partitioning scheme consumed by the cross-validation harness
pub trait FoldSplitter {
    fn n_splits(&self) -> usize;

    /// Split `0..n_samples` into folds whose validation sets cover every row once.
    fn split(&self, n_samples: usize) -> Result<Vec<Fold>>;
}

/// Plain k-fold without shuffling.
///
/// Validation blocks are contiguous; the first `n % k` folds hold one extra row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    pub fn new(n_splits: usize) -> Result<Self> {
        if n_splits < 2 {
            return Err(TrainerError::CrossValidation(format!(
                "n_splits must be at least 2, got {n_splits}"
            )));
        }
        Ok(Self { n_splits })
    }
}

impl FoldSplitter for KFold {
    fn n_splits(&self) -> usize {
        self.n_splits
    }

    fn split(&self, n_samples: usize) -> Result<Vec<Fold>> {
        if n_samples < self.n_splits {
            return Err(TrainerError::CrossValidation(format!(
                "cannot split {n_samples} rows into {} folds",
                self.n_splits
            )));
        }

        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut start = 0;
        let mut folds = Vec::with_capacity(self.n_splits);

        for index in 0..self.n_splits {
            let size = base + usize::from(index < extra);
            let end = start + size;
            folds.push(Fold {
                index,
                fit: (0..start).chain(end..n_samples).collect(),
                valid: (start..end).collect(),
            });
            start = end;
        }

        Ok(folds)
    }
}
