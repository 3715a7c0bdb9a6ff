//! Cross-validated training
//!
//! Runs `Idle -> FoldLoop -> Aggregated -> Done`. Each fold fits a fresh model
//! with early stopping against its validation block, stores the validation
//! predictions out of fold and accumulates test predictions, which are
//! averaged over the folds once the loop is finished.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::dataset::FeatureMatrix;
use crate::errors::{Result, TrainerError};
use crate::folds::FoldSplitter;
use crate::metrics::rmse;
use crate::trainer::{Estimator, EvalSet, Regressor};

/// Progress of a cross-validation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Idle,
    FoldLoop { completed: usize, total: usize },
    Aggregated,
    Done,
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessState::Idle => write!(f, "idle"),
            HarnessState::FoldLoop { completed, total } => {
                write!(f, "fold loop ({completed}/{total})")
            }
            HarnessState::Aggregated => write!(f, "aggregated"),
            HarnessState::Done => write!(f, "done"),
        }
    }
}

/// Score of a single fold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldReport {
    pub fold: usize,
    pub fit_rows: usize,
    pub valid_rows: usize,
    pub rmse: f64,
    pub best_iteration: usize,
}

/// Output of a cross-validation run
#[derive(Debug, Clone)]
pub struct CvResult<M> {
    /// Validation prediction for every training row, in training order
    pub oof: Vec<f64>,
    /// Mean of the fold models' test predictions
    pub test_predictions: Vec<f64>,
    /// RMSE over the whole out-of-fold vector
    pub score: f64,
    pub folds: Vec<FoldReport>,
    pub models: Vec<M>,
}

/// K-fold training harness around an [`Estimator`]
pub struct CvTrainingHarness<E, S> {
    estimator: E,
    splitter: S,
    early_stopping_rounds: usize,
    state: HarnessState,
}

impl<E, S> CvTrainingHarness<E, S>
where
    E: Estimator,
    S: FoldSplitter,
{
    pub fn new(estimator: E, splitter: S, early_stopping_rounds: usize) -> Self {
        Self {
            estimator,
            splitter,
            early_stopping_rounds,
            state: HarnessState::Idle,
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    fn transition(&mut self, next: HarnessState) {
        debug!("harness: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Train one model per fold and score the out-of-fold predictions.
    #[instrument(skip_all, fields(train = train.len(), test = test.len()))]
    pub fn run(
        &mut self,
        train: &FeatureMatrix,
        target: &[f64],
        test: &FeatureMatrix,
    ) -> Result<CvResult<E::Model>> {
        if train.len() != target.len() {
            return Err(TrainerError::CrossValidation(format!(
                "{} training rows but {} targets",
                train.len(),
                target.len()
            )));
        }
        if train.feature_names != test.feature_names {
            return Err(TrainerError::CrossValidation(
                "train and test feature columns differ".to_string(),
            ));
        }

        self.state = HarnessState::Idle;
        let folds = self.splitter.split(train.len())?;
        let total = folds.len();
        self.transition(HarnessState::FoldLoop { completed: 0, total });

        let mut oof = vec![0.0; train.len()];
        let mut test_sum = vec![0.0; test.len()];
        let mut reports = Vec::with_capacity(total);
        let mut models = Vec::with_capacity(total);

        for fold in folds {
            let fit_x = train.select(&fold.fit);
            let fit_y: Vec<f64> = fold.fit.iter().map(|&i| target[i]).collect();
            let valid_x = train.select(&fold.valid);
            let valid_y: Vec<f64> = fold.valid.iter().map(|&i| target[i]).collect();

            info!(
                "Fold {}/{}: fit {} rows, validate {} rows",
                fold.index + 1,
                total,
                fit_x.len(),
                valid_x.len()
            );

            let eval = EvalSet {
                features: &valid_x,
                target: &valid_y,
            };
            let model = self
                .estimator
                .fit(&fit_x, &fit_y, Some(eval), self.early_stopping_rounds)?;

            let valid_pred = model.predict(&valid_x)?;
            for (&row, pred) in fold.valid.iter().zip(&valid_pred) {
                oof[row] = *pred;
            }
            for (sum, pred) in test_sum.iter_mut().zip(model.predict(test)?) {
                *sum += pred;
            }

            let report = FoldReport {
                fold: fold.index,
                fit_rows: fit_x.len(),
                valid_rows: valid_x.len(),
                rmse: rmse(&valid_y, &valid_pred)?,
                best_iteration: model.best_iteration(),
            };
            info!(
                "Fold {} rmse: {:.6} (best iteration {})",
                fold.index + 1,
                report.rmse,
                report.best_iteration
            );
            reports.push(report);
            models.push(model);

            self.transition(HarnessState::FoldLoop {
                completed: models.len(),
                total,
            });
        }

        let test_predictions: Vec<f64> = test_sum.iter().map(|s| s / total as f64).collect();
        let score = rmse(target, &oof)?;
        self.transition(HarnessState::Aggregated);
        info!("Overall out-of-fold rmse: {score:.6}");

        self.transition(HarnessState::Done);
        Ok(CvResult {
            oof,
            test_predictions,
            score,
            folds: reports,
            models,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folds::KFold;
    use std::cell::Cell;

    /// Predicts the mean of its fit target; records nothing between fits
    struct MeanEstimator;

    struct MeanModel(f64);

    impl Regressor for MeanModel {
        fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
            Ok(vec![self.0; features.len()])
        }

        fn best_iteration(&self) -> usize {
            1
        }
    }

    impl Estimator for MeanEstimator {
        type Model = MeanModel;

        fn fit(
            &self,
            _features: &FeatureMatrix,
            target: &[f64],
            _eval: Option<EvalSet<'_>>,
            _early_stopping_rounds: usize,
        ) -> Result<MeanModel> {
            if target.is_empty() {
                return Err(TrainerError::Estimator("empty".into()));
            }
            Ok(MeanModel(target.iter().sum::<f64>() / target.len() as f64))
        }
    }

    fn matrix(n: usize) -> FeatureMatrix {
        FeatureMatrix::from_rows(vec!["x".into()], (0..n).map(|i| vec![i as f64]).collect())
            .unwrap()
    }

    #[test]
    fn test_oof_and_test_average() -> Result<()> {
        let target = vec![1.0, 1.0, 3.0, 3.0];
        let mut harness = CvTrainingHarness::new(MeanEstimator, KFold::new(2)?, 10);
        assert_eq!(harness.state(), HarnessState::Idle);

        let result = harness.run(&matrix(4), &target, &matrix(3))?;

        // fold 0 validates rows 0,1 with a model fit on 3,3
        assert_eq!(result.oof, vec![3.0, 3.0, 1.0, 1.0]);
        assert_eq!(result.test_predictions, vec![2.0, 2.0, 2.0]);
        assert_eq!(result.score, 2.0);
        assert_eq!(result.folds.len(), 2);
        assert_eq!(result.models.len(), 2);
        assert_eq!(harness.state(), HarnessState::Done);
        Ok(())
    }

    /// Fails on the `fail_on`-th call to `fit` (zero based)
    struct FailingEstimator {
        calls: Cell<usize>,
        fail_on: usize,
    }

    impl Estimator for FailingEstimator {
        type Model = MeanModel;

        fn fit(
            &self,
            features: &FeatureMatrix,
            target: &[f64],
            eval: Option<EvalSet<'_>>,
            early_stopping_rounds: usize,
        ) -> Result<MeanModel> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call == self.fail_on {
                return Err(TrainerError::Estimator(format!("fit {call} diverged")));
            }
            MeanEstimator.fit(features, target, eval, early_stopping_rounds)
        }
    }

    #[test]
    fn test_fold_failure_aborts_run() -> Result<()> {
        let estimator = FailingEstimator {
            calls: Cell::new(0),
            fail_on: 1,
        };
        let mut harness = CvTrainingHarness::new(estimator, KFold::new(3)?, 10);

        let result = harness.run(&matrix(6), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &matrix(2));
        assert!(matches!(result, Err(TrainerError::Estimator(_))));
        // the third fold never starts
        assert_eq!(
            harness.state(),
            HarnessState::FoldLoop {
                completed: 1,
                total: 3
            }
        );
        Ok(())
    }

    #[test]
    fn test_mismatched_inputs_rejected() -> Result<()> {
        let mut harness = CvTrainingHarness::new(MeanEstimator, KFold::new(2)?, 10);
        assert!(harness.run(&matrix(4), &[1.0], &matrix(1)).is_err());

        let other = FeatureMatrix::from_rows(vec!["z".into()], vec![vec![0.0]])?;
        assert!(harness.run(&matrix(4), &[1.0; 4], &other).is_err());
        Ok(())
    }
}
