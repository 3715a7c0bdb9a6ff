//! Key-fallback join of reference aggregates onto transaction rows
//!
//! For every key in the hierarchy the reference table is reduced to one mean
//! value per key, and that aggregate is left-joined onto the transaction
//! frame as `<key>_<value column>`. Nulls in the finest aggregate are then
//! filled from the coarser aggregates, strictly in hierarchy order.
//!
//! Aggregation happens before the merge, so every join is many-to-one and
//! never changes the number of transaction rows.

use std::collections::BTreeSet;

use polars::prelude::{col, IntoLazy, SortMultipleOptions};
use tracing::{debug, info, instrument};

use crate::config::JoinConfig;
use crate::errors::{PipelineError, Result};
use crate::frame::{Column, Frame};

/// Canonical key column shared by both sides of an aggregate join
pub const JOIN_KEY: &str = "__join_key";
const ROW_INDEX: &str = "__row";

/// Ordered join keys, finest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKeyHierarchy {
    keys: Vec<String>,
}

impl JoinKeyHierarchy {
    /// The list must be non-empty and free of duplicates.
    pub fn new<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Err(PipelineError::Config(
                "join key hierarchy must not be empty".into(),
            ));
        }
        let distinct: BTreeSet<&String> = keys.iter().collect();
        if distinct.len() != keys.len() {
            return Err(PipelineError::Config(format!(
                "join key hierarchy contains duplicates: {keys:?}"
            )));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn finest(&self) -> &str {
        &self.keys[0]
    }
}

/// Mean reference value per distinct key.
///
/// `table` has two columns: the canonical key text under [`JOIN_KEY`] and the
/// mean under `column`, one row per key in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyAggregate {
    pub key: String,
    pub column: String,
    pub table: Frame,
}

/// Builds, merges and backfills per-key aggregates
#[derive(Debug, Clone)]
pub struct KeyFallbackJoiner {
    hierarchy: JoinKeyHierarchy,
    value_column: String,
}

impl KeyFallbackJoiner {
    pub fn new(hierarchy: JoinKeyHierarchy, value_column: impl Into<String>) -> Self {
        Self {
            hierarchy,
            value_column: value_column.into(),
        }
    }

    pub fn from_config(config: &JoinConfig) -> Result<Self> {
        Ok(Self::new(
            JoinKeyHierarchy::new(config.keys.iter().cloned())?,
            config.value_column.clone(),
        ))
    }

    pub fn hierarchy(&self) -> &JoinKeyHierarchy {
        &self.hierarchy
    }

    /// Name of the aggregate column produced for `key`.
    pub fn aggregate_column(&self, key: &str) -> String {
        format!("{key}_{}", self.value_column)
    }

    /// Aggregate columns in hierarchy order, finest first.
    pub fn aggregate_columns(&self) -> Vec<String> {
        self.hierarchy
            .keys()
            .iter()
            .map(|key| self.aggregate_column(key))
            .collect()
    }

    /// Run the whole join: aggregate, merge, backfill, then check coverage.
    ///
    /// Fails when the finest aggregate is still null for some row after
    /// backfilling, because the reference table does not cover that row even
    /// at the coarsest key.
    #[instrument(skip_all, fields(rows = frame.height()))]
    pub fn join(&self, reference: &Frame, frame: Frame) -> Result<Frame> {
        let aggregates = self.aggregate(reference)?;
        let frame = self.merge(frame, &aggregates)?;
        let frame = self.backfill(frame)?;

        let finest = self.aggregate_column(self.hierarchy.finest());
        let uncovered = frame.column(&finest)?.null_count();
        if uncovered > 0 {
            return Err(PipelineError::DataInvariant(format!(
                "{uncovered} rows have no `{}` aggregate at any key level",
                self.value_column
            )));
        }

        info!(
            "Joined {} aggregates onto {} rows",
            aggregates.len(),
            frame.height()
        );
        Ok(frame)
    }

    /// Group the reference table by each key and average the value column.
    ///
    /// Rows with a null key or a null value are skipped.
    pub fn aggregate(&self, reference: &Frame) -> Result<Vec<KeyAggregate>> {
        let values = reference
            .numeric(&self.value_column)
            .map_err(|_| {
                PipelineError::missing(
                    &self.value_column,
                    "must be a numeric column of the reference table",
                )
            })
            .map(Column::Numeric)?;

        self.hierarchy
            .keys()
            .iter()
            .map(|key| {
                let keys = reference.column(key).map_err(|_| {
                    PipelineError::missing(key, "join key is missing from the reference table")
                })?;
                let column = self.aggregate_column(key);

                let grouped = Frame::from_columns(vec![
                    (JOIN_KEY.to_string(), Column::Text(keys.keys())),
                    (self.value_column.clone(), values.clone()),
                ])?
                .into_dataframe()
                .lazy()
                .drop_nulls(None)
                .group_by_stable([col(JOIN_KEY)])
                .agg([col(self.value_column.as_str()).mean().alias(column.as_str())])
                .collect()?;
                debug!("Key `{key}`: {} distinct reference groups", grouped.height());

                Ok(KeyAggregate {
                    key: key.clone(),
                    column,
                    table: Frame::from(grouped),
                })
            })
            .collect()
    }

    /// Left-join each aggregate on its key column. Unmatched rows get null.
    ///
    /// An existing column with the aggregate's name is replaced. Rows keep
    /// their original order.
    pub fn merge(&self, frame: Frame, aggregates: &[KeyAggregate]) -> Result<Frame> {
        aggregates.iter().try_fold(frame, |frame, aggregate| {
            let height = frame.height();
            let keys = frame.column(&aggregate.key).map_err(|_| {
                PipelineError::missing(
                    &aggregate.key,
                    "join key is missing from the transaction frame",
                )
            })?;
            let frame = if frame.has_column(&aggregate.column) {
                frame.drop_columns(std::slice::from_ref(&aggregate.column))?
            } else {
                frame
            };

            let left = frame
                .with_column(JOIN_KEY, Column::Text(keys.keys()))?
                .into_dataframe()
                .with_row_index(ROW_INDEX.into(), None)?;
            let right = aggregate.table.as_dataframe().clone();

            let joined = left
                .lazy()
                .left_join(right.lazy(), col(JOIN_KEY), col(JOIN_KEY))
                .sort([ROW_INDEX], SortMultipleOptions::default())
                .collect()?;
            let joined =
                Frame::from(joined).drop_columns(&[JOIN_KEY.to_string(), ROW_INDEX.to_string()])?;

            debug!(
                "Joined `{}` from {} reference keys",
                aggregate.column,
                aggregate.table.height()
            );
            if joined.height() != height {
                return Err(PipelineError::DataInvariant(format!(
                    "joining `{}` changed row count from {height} to {}",
                    aggregate.column,
                    joined.height()
                )));
            }
            Ok(joined)
        })
    }

    /// Fill each null of the finest aggregate with the first non-null coarser
    /// aggregate, in hierarchy order. Coarser columns are left untouched.
    pub fn backfill(&self, frame: Frame) -> Result<Frame> {
        let columns = self.aggregate_columns();
        let (finest, coarser) = columns
            .split_first()
            .ok_or_else(|| PipelineError::Config("empty join key hierarchy".into()))?;

        let filled: Vec<Option<f64>> = {
            let target = frame.numeric(finest)?;
            let fallbacks = coarser
                .iter()
                .map(|name| frame.numeric(name))
                .collect::<Result<Vec<_>>>()?;

            target
                .iter()
                .enumerate()
                .map(|(row, value)| {
                    value.or_else(|| fallbacks.iter().find_map(|fallback| fallback[row]))
                })
                .collect()
        };

        let before = frame.column(finest)?.null_count();
        let after = filled.iter().filter(|v| v.is_none()).count();
        debug!("Backfilled {} of {} nulls in `{finest}`", before - after, before);

        frame.with_column(finest, Column::Numeric(filled))
    }
}
