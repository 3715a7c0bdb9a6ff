//! Land-price GBDT trainer
//!
//! Cross-validated gradient boosting on assembled land-price features, with
//! deterministic training, per-run artifacts and submission post-processing.

pub mod artifacts;
pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod folds;
pub mod harness;
pub mod metrics;
pub mod submission;
pub mod trainer;
pub mod tree;

use std::path::PathBuf;

use landprice_pipeline::{AssembledDataset, PipelineConfig};
use tracing::{info, instrument};

pub use artifacts::{CvMetrics, RunArtifacts};
pub use dataset::FeatureMatrix;
pub use deterministic::{LcgRng, SplitTieBreaker};
pub use errors::{Result, TrainerError};
pub use folds::{Fold, FoldSplitter, KFold};
pub use harness::{CvResult, CvTrainingHarness, FoldReport, HarnessState};
pub use submission::{OneBased, RunStamp, Submission, SubmissionPostProcessor, ZeroBased};
pub use trainer::{Estimator, EvalSet, GbdtModel, GbdtParams, GbdtTrainer, Regressor};

/// Effective configuration of a run, written into its log directory
pub const CONFIG_SNAPSHOT: &str = "config.toml";

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub log_dir: PathBuf,
    pub submission_path: PathBuf,
    pub score: f64,
    pub folds: Vec<FoldReport>,
    pub model_hashes: Vec<String>,
}

/// Cross-validate a GBDT on the assembled dataset and write the run directory.
///
/// The submission file is written last, after every other step succeeded.
#[instrument(skip_all, fields(stamp = stamp.as_str()))]
pub fn train_and_submit(
    config: &PipelineConfig,
    dataset: &AssembledDataset,
    stamp: &RunStamp,
) -> Result<RunSummary> {
    let train = FeatureMatrix::from_frame(&dataset.train)?;
    let test = FeatureMatrix::from_frame(&dataset.test)?;
    info!(
        "Training on {} rows x {} features, predicting {} rows",
        train.len(),
        train.feature_count(),
        test.len()
    );

    let params = GbdtParams::from_config(&config.model, &config.cv);
    let mut harness = CvTrainingHarness::new(
        GbdtTrainer::new(params.clone()),
        KFold::new(config.cv.n_splits)?,
        config.cv.early_stopping_rounds,
    );
    let result = harness.run(&train, &dataset.target, &test)?;

    let processor = SubmissionPostProcessor::new(
        config.columns.target.clone(),
        config.output.log_root.clone(),
        stamp.clone(),
    );
    let submission = processor.process(&result.test_predictions)?;

    let artifacts = RunArtifacts::create(stamp.log_dir(&config.output.log_root))?;
    artifacts.write_params(&params)?;
    config.save_to_file(artifacts.dir().join(CONFIG_SNAPSHOT))?;
    artifacts.write_metrics(&CvMetrics {
        metric: "rmse",
        score: result.score,
        folds: &result.folds,
    })?;
    artifacts.write_oof(&dataset.target, &result.oof)?;
    let model_hashes = result
        .models
        .iter()
        .enumerate()
        .map(|(fold, model)| artifacts.write_model(fold, model))
        .collect::<Result<Vec<_>>>()?;

    let submission_path = processor.persist(&submission)?;

    Ok(RunSummary {
        log_dir: artifacts.dir().to_path_buf(),
        submission_path,
        score: result.score,
        folds: result.folds,
        model_hashes,
    })
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
