//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Squared-error boosting with histogram CART splits, deterministic row
//! subsampling and early stopping on a held-out evaluation set.

use landprice_pipeline::config::{CvConfig, ModelConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cart::{BinnedFeatures, CartBuilder, TreeConfig};
use crate::dataset::FeatureMatrix;
use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};
use crate::metrics::rmse;
use crate::tree::Tree;

/// Held-out rows scored after every boosting round
#[derive(Clone, Copy, Debug)]
pub struct EvalSet<'a> {
    pub features: &'a FeatureMatrix,
    pub target: &'a [f64],
}

/// A fitted model
pub trait Regressor {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Number of boosting rounds kept after early stopping
    fn best_iteration(&self) -> usize;
}

/// Produces a fresh model per call; no state is shared between fits.
pub trait Estimator {
    type Model: Regressor;

    fn fit(
        &self,
        features: &FeatureMatrix,
        target: &[f64],
        eval: Option<EvalSet<'_>>,
        early_stopping_rounds: usize,
    ) -> Result<Self::Model>;
}

/// GBDT training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbdtParams {
    pub learning_rate: f64,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub subsample: f64,
    pub reg_lambda: f64,
    pub max_bins: usize,
    pub seed: i64,
    /// Log the validation score every this many rounds (0 disables)
    pub verbose_eval: usize,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default(), &CvConfig::default())
    }
}

impl GbdtParams {
    pub fn from_config(model: &ModelConfig, cv: &CvConfig) -> Self {
        Self {
            learning_rate: model.learning_rate,
            n_estimators: model.n_estimators,
            max_depth: model.max_depth,
            min_samples_leaf: model.min_samples_leaf,
            subsample: model.subsample,
            reg_lambda: model.reg_lambda,
            max_bins: model.max_bins,
            seed: model.seed,
            verbose_eval: cv.verbose_eval,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(TrainerError::Estimator(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(TrainerError::Estimator(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        if self.n_estimators == 0 {
            return Err(TrainerError::Estimator("n_estimators must be positive".to_string()));
        }
        if self.reg_lambda < 0.0 {
            return Err(TrainerError::Estimator(format!(
                "reg_lambda must be non-negative, got {}",
                self.reg_lambda
            )));
        }
        Ok(())
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            reg_lambda: self.reg_lambda,
        }
    }
}

/// Fitted additive tree ensemble: `bias + learning_rate * sum(trees)`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbdtModel {
    pub feature_names: Vec<String>,
    pub bias: f64,
    pub learning_rate: f64,
    pub trees: Vec<Tree>,
    pub best_iteration: usize,
    /// Evaluation RMSE at `best_iteration`, when an eval set was given
    pub best_score: Option<f64>,
}

impl GbdtModel {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.bias
            + self.learning_rate * self.trees.iter().map(|t| t.evaluate(row)).sum::<f64>()
    }
}

impl Regressor for GbdtModel {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.feature_names != self.feature_names {
            return Err(TrainerError::Estimator(format!(
                "model expects {} features, matrix has {} (or a different order)",
                self.feature_names.len(),
                features.feature_count()
            )));
        }
        Ok(features.rows.iter().map(|row| self.predict_row(row)).collect())
    }

    fn best_iteration(&self) -> usize {
        self.best_iteration
    }
}

/// GBDT trainer
#[derive(Clone, Debug, Default)]
pub struct GbdtTrainer {
    params: GbdtParams,
}

impl GbdtTrainer {
    pub fn new(params: GbdtParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    fn check_inputs(
        &self,
        features: &FeatureMatrix,
        target: &[f64],
        eval: Option<&EvalSet<'_>>,
    ) -> Result<()> {
        self.params.validate()?;

        if features.is_empty() {
            return Err(TrainerError::Estimator("cannot fit on an empty dataset".to_string()));
        }
        if features.len() != target.len() {
            return Err(TrainerError::Estimator(format!(
                "{} feature rows but {} targets",
                features.len(),
                target.len()
            )));
        }
        if let Some(row) = target.iter().position(|t| !t.is_finite()) {
            return Err(TrainerError::Estimator(format!("target row {row} is not finite")));
        }

        if let Some(eval) = eval {
            if eval.features.feature_names != features.feature_names {
                return Err(TrainerError::Estimator(
                    "evaluation features differ from training features".to_string(),
                ));
            }
            if eval.features.len() != eval.target.len() || eval.target.is_empty() {
                return Err(TrainerError::Estimator(format!(
                    "evaluation set has {} rows and {} targets",
                    eval.features.len(),
                    eval.target.len()
                )));
            }
            if eval.target.iter().any(|t| !t.is_finite()) {
                return Err(TrainerError::Estimator(
                    "evaluation target is not finite".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Estimator for GbdtTrainer {
    type Model = GbdtModel;

    /// Boost until `n_estimators` or until the evaluation RMSE has not improved
    /// for `early_stopping_rounds` rounds; the model keeps only the best rounds.
    fn fit(
        &self,
        features: &FeatureMatrix,
        target: &[f64],
        eval: Option<EvalSet<'_>>,
        early_stopping_rounds: usize,
    ) -> Result<GbdtModel> {
        self.check_inputs(features, target, eval.as_ref())?;
        let params = &self.params;

        let binned = BinnedFeatures::fit(features, params.max_bins);
        let tree_config = params.tree_config();
        let mut rng = LcgRng::new(params.seed);

        let bias = target.iter().sum::<f64>() / target.len() as f64;
        let mut predictions = vec![bias; target.len()];
        let hessians = vec![1.0; target.len()];

        // The first round is always kept, even when it scores worse than the bias alone
        let mut eval_predictions = eval.map(|e| vec![bias; e.target.len()]);
        let mut best_score: Option<f64> = None;
        let mut best_iteration = 0;

        let mut trees = Vec::new();
        for round in 0..params.n_estimators {
            // Gradient of squared error; hessian is constant
            let gradients: Vec<f64> = predictions
                .iter()
                .zip(target)
                .map(|(p, t)| p - t)
                .collect();

            let rows = rng.sample_indices(target.len(), params.subsample);
            let tree = CartBuilder::new(&tree_config, &binned, &gradients, &hessians).build(&rows);
            tree.validate()?;

            for (pred, row) in predictions.iter_mut().zip(&features.rows) {
                *pred += params.learning_rate * tree.evaluate(row);
            }

            let iteration = round + 1;
            let score = match (&eval, eval_predictions.as_mut()) {
                (Some(e), Some(p)) => {
                    for (pred, row) in p.iter_mut().zip(&e.features.rows) {
                        *pred += params.learning_rate * tree.evaluate(row);
                    }
                    Some(rmse(e.target, p)?)
                }
                _ => None,
            };
            trees.push(tree);

            if params.verbose_eval > 0 && iteration % params.verbose_eval == 0 {
                match score {
                    Some(s) => info!("[{iteration}] valid rmse: {s:.6}"),
                    None => info!("[{iteration}] trees built"),
                }
            }

            let Some(score) = score else {
                best_iteration = iteration;
                continue;
            };
            if best_score.map_or(true, |best| score < best) {
                best_score = Some(score);
                best_iteration = iteration;
            } else if early_stopping_rounds > 0 && iteration - best_iteration >= early_stopping_rounds
            {
                debug!(
                    "Early stopping at round {iteration}; best round {best_iteration} with rmse {:.6}",
                    best_score.unwrap_or(f64::NAN)
                );
                break;
            }
        }

        trees.truncate(best_iteration);
        debug!("Fitted {} trees (bias {bias:.6})", trees.len());

        Ok(GbdtModel {
            feature_names: features.feature_names.clone(),
            bias,
            learning_rate: params.learning_rate,
            trees,
            best_iteration,
            best_score,
        })
    }
}
