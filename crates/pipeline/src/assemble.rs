//! Unified train/test feature assembly
//!
//! Train and test rows are stacked into one frame so that joins and encodings
//! see every row. Test rows carry a sentinel target below any `log1p`
//! transformed real target, which lets the frame be split back by the sign of
//! the target after encoding.

use tracing::{info, instrument};

use crate::config::ColumnConfig;
use crate::encode::CategoricalEncoder;
use crate::errors::{PipelineError, Result};
use crate::frame::{Column, Frame};
use crate::join::KeyFallbackJoiner;

/// Target value marking test rows inside the unified frame
pub const TEST_SENTINEL: f64 = -1.0;

/// Feature frames ready for modelling
#[derive(Debug, Clone)]
pub struct AssembledDataset {
    pub train: Frame,
    pub test: Frame,
    /// Training target in `log1p` space, aligned with `train` rows
    pub target: Vec<f64>,
}

/// Stacks, joins, encodes and re-splits train and test frames
pub struct DatasetAssembler<E> {
    columns: ColumnConfig,
    joiner: KeyFallbackJoiner,
    encoder: E,
    categorical: Vec<String>,
}

impl<E: CategoricalEncoder> DatasetAssembler<E> {
    pub fn new(
        columns: ColumnConfig,
        joiner: KeyFallbackJoiner,
        encoder: E,
        categorical: Vec<String>,
    ) -> Self {
        Self {
            columns,
            joiner,
            encoder,
            categorical,
        }
    }

    /// Produce train/test feature frames and the log-space target.
    #[instrument(skip_all, fields(train = train.height(), test = test.height()))]
    pub fn assemble(&self, train: Frame, test: Frame, reference: &Frame) -> Result<AssembledDataset> {
        let train_rows = train.height();
        let test_rows = test.height();

        let train = self.log_target(train)?;
        let test = self.mark_test(test)?;
        let unified = train.concat(test)?;
        check_rows("concatenation", train_rows + test_rows, unified.height())?;

        let unified = self.joiner.join(reference, unified)?;
        check_rows("key-fallback join", train_rows + test_rows, unified.height())?;

        let unified = unified.drop_columns(&self.columns.drop)?;
        let unified = self.encoder.encode(unified, &self.categorical)?;
        check_rows("encoding", train_rows + test_rows, unified.height())?;
        ensure_numeric(&unified)?;

        let (train, test, target) = self.split(unified)?;
        check_rows("train split", train_rows, train.height())?;
        check_rows("test split", test_rows, test.height())?;

        info!(
            "Assembled {} train and {} test rows with {} features",
            train.height(),
            test.height(),
            train.width()
        );
        Ok(AssembledDataset { train, test, target })
    }

    /// Validate the raw target and replace it with `log1p(y)`.
    fn log_target(&self, train: Frame) -> Result<Frame> {
        let name = &self.columns.target;
        let logged = train
            .numeric(name)?
            .iter()
            .enumerate()
            .map(|(row, value)| match value {
                Some(v) if v.is_finite() && *v >= 0.0 => Ok(Some(v.ln_1p())),
                Some(v) => Err(PipelineError::DataInvariant(format!(
                    "training target `{name}` row {row} is {v}; targets must be finite and >= 0"
                ))),
                None => Err(PipelineError::DataInvariant(format!(
                    "training target `{name}` row {row} is null"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        train.with_column(name, Column::Numeric(logged))
    }

    /// Overwrite (or add) the target column of the test rows with the sentinel.
    fn mark_test(&self, test: Frame) -> Result<Frame> {
        let sentinel = vec![Some(TEST_SENTINEL); test.height()];
        test.with_column(&self.columns.target, Column::Numeric(sentinel))
    }

    /// Split by target sign: `>= 0` is train, `< 0` is test. Order is kept.
    fn split(&self, unified: Frame) -> Result<(Frame, Frame, Vec<f64>)> {
        let (features, target) = unified.take_column(&self.columns.target)?;
        let target = match target {
            Column::Numeric(values) => values,
            Column::Text(_) => {
                return Err(PipelineError::missing(&self.columns.target, "is not numeric"))
            }
        };

        let mut train_rows = Vec::new();
        let mut test_rows = Vec::new();
        let mut train_target = Vec::new();
        for (row, value) in target.iter().enumerate() {
            match value {
                Some(v) if *v >= 0.0 => {
                    train_rows.push(row);
                    train_target.push(*v);
                }
                Some(_) => test_rows.push(row),
                None => {
                    return Err(PipelineError::DataInvariant(format!(
                        "unified frame row {row} lost its target marker"
                    )))
                }
            }
        }

        Ok((
            features.take_rows(&train_rows)?,
            features.take_rows(&test_rows)?,
            train_target,
        ))
    }
}

fn check_rows(stage: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(PipelineError::DataInvariant(format!(
            "{stage} produced {actual} rows, expected {expected}"
        )));
    }
    Ok(())
}

fn ensure_numeric(frame: &Frame) -> Result<()> {
    match frame.first_text_column() {
        Some(name) => Err(PipelineError::missing(
            name,
            "is still text after encoding; list it as categorical or drop it",
        )),
        None => Ok(()),
    }
}
