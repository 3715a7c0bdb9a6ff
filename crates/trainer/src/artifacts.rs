//! Run artifacts
//!
//! Everything a run produces lands in `<log_root>/<stamp>/`: the parameters,
//! cross-validation metrics, out-of-fold predictions and one JSON model per
//! fold together with its BLAKE3 digest.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::errors::Result;
use crate::harness::FoldReport;

/// Serialize with object keys in sorted order so that equal models hash equally.
pub fn canonical_json_string<T: Serialize>(value: &T) -> Result<String> {
    // serde_json::Map is ordered by key unless `preserve_order` is enabled
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

/// Hex-encoded BLAKE3 digest
pub fn content_hash(content: &str) -> String {
    hex::encode(blake3::hash(content.as_bytes()).as_bytes())
}

/// Cross-validation summary written to `metrics.json`
#[derive(Debug, Clone, Serialize)]
pub struct CvMetrics<'a> {
    pub metric: &'static str,
    pub score: f64,
    pub folds: &'a [FoldReport],
}

/// Writer for one run's log directory
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    dir: PathBuf,
}

impl RunArtifacts {
    /// Create (if needed) the run directory.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!("Run artifacts in {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_params<P: Serialize>(&self, params: &P) -> Result<PathBuf> {
        self.write_json("params.json", params)
    }

    pub fn write_metrics(&self, metrics: &CvMetrics<'_>) -> Result<PathBuf> {
        self.write_json("metrics.json", metrics)
    }

    /// `oof.csv` with the log-space target next to its out-of-fold prediction
    pub fn write_oof(&self, target: &[f64], oof: &[f64]) -> Result<PathBuf> {
        let path = self.dir.join("oof.csv");
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["row", "target", "oof"])?;
        for (row, (t, p)) in target.iter().zip(oof).enumerate() {
            writer.write_record([row.to_string(), t.to_string(), p.to_string()])?;
        }
        writer.flush()?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// `fold_<k>.json` in canonical form plus `fold_<k>.hash`; returns the hash.
    pub fn write_model<M: Serialize>(&self, fold: usize, model: &M) -> Result<String> {
        let json = canonical_json_string(model)?;
        let hash = content_hash(&json);

        let model_path = self.dir.join(format!("fold_{fold}.json"));
        std::fs::write(&model_path, &json)?;
        std::fs::write(self.dir.join(format!("fold_{fold}.hash")), &hash)?;
        debug!("Saved {} ({})", model_path.display(), hash);
        Ok(hash)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_canonical_json_sorts_keys() -> Result<()> {
        let mut a = HashMap::new();
        a.insert("zeta", 1);
        a.insert("alpha", 2);
        assert_eq!(canonical_json_string(&a)?, r#"{"alpha":2,"zeta":1}"#);
        Ok(())
    }

    #[test]
    fn test_model_and_hash_written() -> Result<()> {
        let dir = tempdir()?;
        let artifacts = RunArtifacts::create(dir.path().join("run"))?;

        let hash = artifacts.write_model(0, &vec![1.5, 2.5])?;
        assert_eq!(hash.len(), 64);
        let json = std::fs::read_to_string(artifacts.dir().join("fold_0.json"))?;
        assert_eq!(json, "[1.5,2.5]");
        assert_eq!(content_hash(&json), hash);
        assert_eq!(
            std::fs::read_to_string(artifacts.dir().join("fold_0.hash"))?,
            hash
        );
        Ok(())
    }

    #[test]
    fn test_metrics_and_oof() -> Result<()> {
        let dir = tempdir()?;
        let artifacts = RunArtifacts::create(dir.path())?;
        let folds = vec![FoldReport {
            fold: 0,
            fit_rows: 3,
            valid_rows: 1,
            rmse: 0.5,
            best_iteration: 7,
        }];
        let metrics_path = artifacts.write_metrics(&CvMetrics {
            metric: "rmse",
            score: 0.5,
            folds: &folds,
        })?;
        let metrics: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(metrics_path)?)?;
        assert_eq!(metrics["folds"][0]["best_iteration"], 7);

        let oof_path = artifacts.write_oof(&[1.0, 2.0], &[1.5, 2.0])?;
        assert_eq!(
            std::fs::read_to_string(oof_path)?,
            "row,target,oof\n0,1,1.5\n1,2,2\n"
        );
        Ok(())
    }
}
