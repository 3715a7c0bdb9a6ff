//! Error types for the feature assembly pipeline

use thiserror::Error;

/// Errors that can occur while loading, joining, encoding or splitting frames.
///
/// None of these are retried: the pipeline is deterministic, so every error
/// points at a data or configuration defect.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An expected column or join key is missing or has the wrong type
    #[error("Schema error: column `{column}` {context}")]
    Schema { column: String, context: String },

    /// A data invariant does not hold (sentinel collision, row loss, uncovered key)
    #[error("Data invariant violated: {0}")]
    DataInvariant(String),

    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse or write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Frame operation rejected by polars
    #[error("Frame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl PipelineError {
    /// Shorthand for a missing column.
    pub fn missing(column: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
            context: context.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
