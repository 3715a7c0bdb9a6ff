//! Dense feature matrices for the estimator
//!
//! Converts assembled frames into row-major `f64` matrices. Nulls become
//! `NaN`; tree splits route `NaN` to the right child.

use landprice_pipeline::{Column, Frame, PipelineError};

use crate::errors::{Result, TrainerError};

/// Row-major feature matrix with named columns
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Build a matrix from an all-numeric frame
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let mut feature_names = Vec::with_capacity(frame.width());
        let mut rows = vec![Vec::with_capacity(frame.width()); frame.height()];

        for (name, column) in frame.columns()? {
            let values = match column {
                Column::Numeric(values) => values,
                Column::Text(_) => {
                    return Err(PipelineError::missing(name, "must be numeric to train on").into())
                }
            };
            for (row, value) in rows.iter_mut().zip(values) {
                row.push(value.unwrap_or(f64::NAN));
            }
            feature_names.push(name);
        }

        Ok(Self {
            feature_names,
            rows,
        })
    }

    pub fn from_rows(feature_names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(bad) = rows.iter().position(|r| r.len() != feature_names.len()) {
            return Err(TrainerError::Estimator(format!(
                "row {bad} has {} values, expected {}",
                rows[bad].len(),
                feature_names.len()
            )));
        }
        Ok(Self {
            feature_names,
            rows,
        })
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if matrix is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    /// Gather rows by index into a new matrix
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}
