//! Integration tests for cross-validated training and submission output
//!
//! Ensures identical runs produce identical models and that the written
//! submission follows the external id and value conventions.

use anyhow::Result;
use landprice_pipeline::{AssembledDataset, Column, Frame, PipelineConfig};
use landprice_trainer::{
    train_and_submit, CvTrainingHarness, Estimator, FeatureMatrix, GbdtParams, GbdtTrainer,
    KFold, Regressor, RunStamp, Submission, TrainerError, CONFIG_SNAPSHOT,
};
use proptest::prelude::*;
use std::path::Path;
use tempfile::tempdir;

/// Synthetic assembled dataset: log price grows with the aggregate column
fn synthetic_dataset() -> Result<AssembledDataset> {
    let n: u32 = 60;
    let aggregate: Vec<Option<f64>> = (0..n).map(|i| Some(f64::from(i % 12) * 10.0)).collect();
    let area: Vec<Option<f64>> = (0..n)
        .map(|i| if i % 7 == 0 { None } else { Some(f64::from(i * 3 % 50)) })
        .collect();
    let target: Vec<f64> = aggregate
        .iter()
        .zip(&area)
        .map(|(a, s)| (a.unwrap_or(0.0) * 1000.0 + s.unwrap_or(25.0) * 10.0).ln_1p())
        .collect();

    let train = Frame::from_columns(vec![
        ("district_land_price", Column::Numeric(aggregate)),
        ("Area", Column::Numeric(area)),
    ])?;
    let test = Frame::from_columns(vec![
        (
            "district_land_price",
            Column::Numeric(vec![Some(0.0), Some(50.0), Some(110.0)]),
        ),
        ("Area", Column::Numeric(vec![Some(10.0), None, Some(40.0)])),
    ])?;

    Ok(AssembledDataset {
        train,
        test,
        target,
    })
}

fn small_config(log_root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.model.learning_rate = 0.1;
    config.model.n_estimators = 40;
    config.model.max_depth = 3;
    config.model.min_samples_leaf = 2;
    config.cv.n_splits = 3;
    config.cv.early_stopping_rounds = 10;
    config.cv.verbose_eval = 0;
    config.output.log_root = log_root.to_path_buf();
    config
}

#[test]
fn test_run_writes_submission_and_artifacts() -> Result<()> {
    let dir = tempdir()?;
    let config = small_config(dir.path());
    let stamp = RunStamp::from_string("20191220_104512");

    let summary = train_and_submit(&config, &synthetic_dataset()?, &stamp)?;

    assert_eq!(summary.log_dir, dir.path().join("20191220_104512"));
    assert_eq!(
        summary.submission_path,
        summary.log_dir.join("20191220_104512.csv")
    );
    assert_eq!(summary.folds.len(), 3);
    assert_eq!(summary.model_hashes.len(), 3);
    assert!(summary.score.is_finite());

    for name in [
        "params.json",
        "metrics.json",
        "oof.csv",
        "fold_0.json",
        "fold_2.hash",
        CONFIG_SNAPSHOT,
    ] {
        assert!(summary.log_dir.join(name).exists(), "{name} missing");
    }
    assert_eq!(
        PipelineConfig::load_from_file(summary.log_dir.join(CONFIG_SNAPSHOT))?,
        config
    );

    let mut reader = csv::Reader::from_path(&summary.submission_path)?;
    assert_eq!(reader.headers()?.iter().collect::<Vec<_>>(), vec!["id", "y"]);
    let rows: Vec<(u64, f64)> = reader
        .deserialize()
        .collect::<std::result::Result<_, _>>()?;
    assert_eq!(rows.iter().map(|r| r.0).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(rows.iter().all(|r| r.1 >= 0.0));
    Ok(())
}

#[test]
fn test_failed_fold_writes_no_submission() -> Result<()> {
    let dir = tempdir()?;
    let config = small_config(dir.path());
    let stamp = RunStamp::from_string("20191220_104512");

    let mut dataset = synthetic_dataset()?;
    let last = dataset.target.len() - 1;
    dataset.target[last] = f64::NAN;

    let result = train_and_submit(&config, &dataset, &stamp);
    assert!(matches!(result, Err(TrainerError::Estimator(_))));

    let log_dir = dir.path().join("20191220_104512");
    assert!(!log_dir.join("20191220_104512.csv").exists());
    assert!(!log_dir.join("metrics.json").exists());
    Ok(())
}

#[test]
fn test_deterministic_runs() -> Result<()> {
    let dir = tempdir()?;
    let config = small_config(dir.path());
    let dataset = synthetic_dataset()?;

    let first = train_and_submit(&config, &dataset, &RunStamp::from_string("run_a"))?;
    let second = train_and_submit(&config, &dataset, &RunStamp::from_string("run_b"))?;

    assert_eq!(first.score, second.score, "CV score should be identical");
    assert_eq!(
        first.model_hashes, second.model_hashes,
        "Fold models should hash identically"
    );
    assert_eq!(
        std::fs::read_to_string(first.log_dir.join("oof.csv"))?,
        std::fs::read_to_string(second.log_dir.join("oof.csv"))?
    );
    Ok(())
}

#[test]
fn test_negative_fold_prediction_is_clamped() {
    let submission = Submission::from_original_units(vec![-150_000.0, 3_000_000.0]);
    let external = submission.into_external_ids();
    assert_eq!(external.values(), &[0.0, 3_000_000.0]);
}

#[test]
fn test_first_internal_id_becomes_one() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("out.csv");
    Submission::from_log_predictions(&[12.0])?
        .into_external_ids()
        .write_csv(&path, "y")?;

    let content = std::fs::read_to_string(&path)?;
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("id,y"));
    assert!(lines.next().is_some_and(|line| line.starts_with("1,")));
    Ok(())
}

#[test]
fn test_harness_models_match_direct_fit_shape() -> Result<()> {
    let dataset = synthetic_dataset()?;
    let train = FeatureMatrix::from_frame(&dataset.train)?;
    let test = FeatureMatrix::from_frame(&dataset.test)?;

    let mut params = GbdtParams::from_config(
        &small_config(Path::new("unused")).model,
        &small_config(Path::new("unused")).cv,
    );
    params.n_estimators = 15;
    let trainer = GbdtTrainer::new(params);

    let mut harness = CvTrainingHarness::new(trainer.clone(), KFold::new(4)?, 0);
    let result = harness.run(&train, &dataset.target, &test)?;
    assert_eq!(result.oof.len(), train.len());
    assert_eq!(result.test_predictions.len(), test.len());

    // Without an eval set every round is kept
    let direct = trainer.fit(&train, &dataset.target, None, 0)?;
    assert_eq!(direct.best_iteration(), 15);
    assert_eq!(direct.predict(&test)?.len(), 3);
    Ok(())
}

proptest! {
    #[test]
    fn prop_submission_values_never_negative(preds in prop::collection::vec(-30.0f64..30.0, 0..50)) {
        let submission = Submission::from_log_predictions(&preds).unwrap();
        prop_assert!(submission.values().iter().all(|v| *v >= 0.0));
        prop_assert_eq!(submission.len(), preds.len());
    }

    #[test]
    fn prop_log_target_round_trips(price in 0.0f64..1.0e8) {
        let restored = landprice_trainer::submission::inverse_target(price.ln_1p());
        prop_assert!((restored - price).abs() <= 1e-6 * price.max(1.0));
    }

    #[test]
    fn prop_ids_are_one_based_and_contiguous(n in 0usize..40) {
        let external = Submission::from_original_units(vec![1.0; n]).into_external_ids();
        prop_assert_eq!(external.ids().to_vec(), (1..=n as u64).collect::<Vec<_>>());
    }
}
