use landprice_pipeline::PipelineError;
use thiserror::Error;

/// Errors returned by the trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("estimator error: {0}")]
    Estimator(String),

    #[error("cross-validation error: {0}")]
    CrossValidation(String),

    #[error("submission error: {0}")]
    Submission(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for trainer operations
pub type Result<T> = std::result::Result<T, TrainerError>;
