//! Submission post-processing
//!
//! Maps log-space predictions back to price units, clamps them at zero and
//! shifts record identifiers from 0-based to the external 1-based scheme.
//! The shift is encoded in the type: only a `Submission<ZeroBased>` can be
//! converted, and only a `Submission<OneBased>` can be written.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::errors::{Result, TrainerError};

/// Identifiers are row positions starting at 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroBased;

/// Identifiers follow the external scheme starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneBased;

/// Test predictions in original units, one per test record in input order
#[derive(Debug, Clone, PartialEq)]
pub struct Submission<S> {
    ids: Vec<u64>,
    values: Vec<f64>,
    _ids: PhantomData<S>,
}

impl<S> Submission<S> {
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// `expm1(v)` clamped below at 0
pub fn inverse_target(value: f64) -> f64 {
    clamp_non_negative(value.exp_m1())
}

pub fn clamp_non_negative(value: f64) -> f64 {
    if value < 0.0 {
        0.0
    } else {
        value
    }
}

impl Submission<ZeroBased> {
    /// Build from averaged log-space predictions.
    pub fn from_log_predictions(predictions: &[f64]) -> Result<Self> {
        if let Some(row) = predictions.iter().position(|p| !p.is_finite()) {
            return Err(TrainerError::Submission(format!(
                "prediction for test row {row} is not finite"
            )));
        }
        Ok(Self::from_original_units(
            predictions.iter().map(|&p| inverse_target(p)).collect(),
        ))
    }

    /// Build from predictions already in price units; negatives become 0.
    pub fn from_original_units(values: Vec<f64>) -> Self {
        Self {
            ids: (0..values.len() as u64).collect(),
            values: values.into_iter().map(clamp_non_negative).collect(),
            _ids: PhantomData,
        }
    }

    /// Shift identifiers to the external 1-based scheme.
    pub fn into_external_ids(self) -> Submission<OneBased> {
        Submission {
            ids: self.ids.into_iter().map(|id| id + 1).collect(),
            values: self.values,
            _ids: PhantomData,
        }
    }
}

impl Submission<OneBased> {
    /// Write `id,<target>` rows.
    pub fn write_csv(&self, path: &Path, target_name: &str) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["id", target_name])?;
        for (id, value) in self.ids.iter().zip(&self.values) {
            writer.write_record([id.to_string(), value.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Timestamp shared by the run's log directory and submission file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp(String);

impl RunStamp {
    /// Current local time rendered with `format` (e.g. `%Y%m%d_%H%M%S`)
    pub fn now(format: &str) -> Self {
        Self(Local::now().format(format).to_string())
    }

    pub fn from_string(stamp: impl Into<String>) -> Self {
        Self(stamp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<log_root>/<stamp>`
    pub fn log_dir(&self, log_root: &Path) -> PathBuf {
        log_root.join(&self.0)
    }

    /// `<log_root>/<stamp>/<stamp>.csv`
    pub fn submission_path(&self, log_root: &Path) -> PathBuf {
        self.log_dir(log_root).join(format!("{}.csv", self.0))
    }
}

/// Turns averaged test predictions into the persisted submission file
#[derive(Debug, Clone)]
pub struct SubmissionPostProcessor {
    target_name: String,
    log_root: PathBuf,
    stamp: RunStamp,
}

impl SubmissionPostProcessor {
    pub fn new(target_name: impl Into<String>, log_root: impl Into<PathBuf>, stamp: RunStamp) -> Self {
        Self {
            target_name: target_name.into(),
            log_root: log_root.into(),
            stamp,
        }
    }

    pub fn process(&self, log_predictions: &[f64]) -> Result<Submission<OneBased>> {
        Ok(Submission::from_log_predictions(log_predictions)?.into_external_ids())
    }

    /// Write the submission into the run's log directory and return its path.
    pub fn persist(&self, submission: &Submission<OneBased>) -> Result<PathBuf> {
        let path = self.stamp.submission_path(&self.log_root);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        submission.write_csv(&path, &self.target_name)?;
        info!("Wrote {} predictions to {}", submission.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_negative_prices_clamped() {
        let submission = Submission::from_original_units(vec![-150_000.0, 1_250_000.0]);
        assert_eq!(submission.values(), &[0.0, 1_250_000.0]);
    }

    #[test]
    fn test_log_predictions_inverted() -> Result<()> {
        let submission = Submission::from_log_predictions(&[0.0, 2.0f64.ln_1p(), -0.5])?;
        assert_eq!(submission.values()[0], 0.0);
        assert!((submission.values()[1] - 2.0).abs() < 1e-12);
        assert_eq!(submission.values()[2], 0.0);
        assert!(Submission::from_log_predictions(&[f64::NAN]).is_err());
        Ok(())
    }

    #[test]
    fn test_ids_shift_once() {
        let zero = Submission::from_original_units(vec![1.0, 2.0, 3.0]);
        assert_eq!(zero.ids(), &[0, 1, 2]);
        let one = zero.into_external_ids();
        assert_eq!(one.ids(), &[1, 2, 3]);
    }

    #[test]
    fn test_stamp_paths() {
        let stamp = RunStamp::from_string("20191220_104512");
        let root = Path::new("logs");
        assert_eq!(stamp.log_dir(root), PathBuf::from("logs/20191220_104512"));
        assert_eq!(
            stamp.submission_path(root),
            PathBuf::from("logs/20191220_104512/20191220_104512.csv")
        );
        assert_eq!(RunStamp::now("%Y%m%d_%H%M%S").as_str().len(), 15);
    }

    #[test]
    fn test_persist_writes_csv() -> Result<()> {
        let dir = tempdir()?;
        let processor = SubmissionPostProcessor::new(
            "y",
            dir.path(),
            RunStamp::from_string("20200101_000000"),
        );
        let submission = processor.process(&[0.0, -0.25])?;
        let path = processor.persist(&submission)?;

        let content = std::fs::read_to_string(path)?;
        assert_eq!(content, "id,y\n1,0\n2,0\n");
        Ok(())
    }
}
