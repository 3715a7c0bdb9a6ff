//! Categorical encoding
//!
//! The assembler only depends on [`CategoricalEncoder`]; [`CategoryEncoder`]
//! is the implementation used by the trainer binary.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::EncodingConfig;
use crate::errors::{PipelineError, Result};
use crate::frame::{Column, Frame};

/// Replaces the listed columns with numeric equivalents.
///
/// Implementations must keep the row count and row order of the frame.
pub trait CategoricalEncoder {
    fn encode(&self, frame: Frame, columns: &[String]) -> Result<Frame>;
}

/// Label encoding with optional multi-label one-hot expansion.
///
/// Columns in the one-hot set are split on `delimiter` and expanded into
/// `<column>_<label>` indicator columns (the source column is removed). Every
/// other listed column is label encoded: distinct values sorted, mapped to
/// `0..k` in value order (numeric order for numeric columns), nulls stay
/// null.
#[derive(Debug, Clone, Default)]
pub struct CategoryEncoder {
    one_hot: BTreeSet<String>,
    delimiter: String,
}

impl CategoryEncoder {
    pub fn new<I, S>(one_hot: I, delimiter: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            one_hot: one_hot.into_iter().map(Into::into).collect(),
            delimiter: delimiter.into(),
        }
    }

    pub fn from_config(config: &EncodingConfig) -> Self {
        Self::new(config.one_hot.iter().cloned(), config.delimiter.clone())
    }

    /// Columns the assembler should hand to [`CategoricalEncoder::encode`].
    pub fn columns_from_config(config: &EncodingConfig) -> Vec<String> {
        config
            .categorical
            .iter()
            .chain(config.one_hot.iter())
            .cloned()
            .collect()
    }

    /// Codes follow the value order of the column: numeric order for numeric
    /// columns, byte order of the text otherwise.
    fn label_encode(column: &Column) -> Column {
        match column {
            Column::Numeric(values) => {
                let mut distinct: Vec<f64> = values.iter().flatten().copied().collect();
                distinct.sort_by(f64::total_cmp);
                distinct.dedup_by(|a, b| a.total_cmp(b).is_eq());

                let code = |v: f64| distinct.partition_point(|d| d.total_cmp(&v).is_lt()) as f64;
                Column::Numeric(values.iter().map(|value| value.map(code)).collect())
            }
            Column::Text(values) => {
                let codes: BTreeMap<&str, f64> = values
                    .iter()
                    .flatten()
                    .map(String::as_str)
                    .collect::<BTreeSet<&str>>()
                    .into_iter()
                    .enumerate()
                    .map(|(code, key)| (key, code as f64))
                    .collect();

                Column::Numeric(
                    values
                        .iter()
                        .map(|value| value.as_deref().and_then(|v| codes.get(v).copied()))
                        .collect(),
                )
            }
        }
    }

    fn split_labels<'a>(&'a self, value: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        value
            .split(self.delimiter.as_str())
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }

    fn one_hot_encode(&self, name: &str, column: &Column) -> Vec<(String, Column)> {
        let keys = column.keys();
        let labels: BTreeSet<&str> = keys
            .iter()
            .flatten()
            .flat_map(|value| self.split_labels(value))
            .collect();

        labels
            .into_iter()
            .map(|label| {
                let indicator = keys
                    .iter()
                    .map(|key| {
                        let hit = key
                            .as_deref()
                            .is_some_and(|v| self.split_labels(v).any(|l| l == label));
                        Some(if hit { 1.0 } else { 0.0 })
                    })
                    .collect();
                (format!("{name}_{label}"), Column::Numeric(indicator))
            })
            .collect()
    }
}

impl CategoricalEncoder for CategoryEncoder {
    fn encode(&self, frame: Frame, columns: &[String]) -> Result<Frame> {
        let height = frame.height();
        let mut frame = frame;

        for name in columns {
            if !frame.has_column(name) {
                return Err(PipelineError::missing(name, "is listed for encoding but absent"));
            }

            if self.one_hot.contains(name) {
                let (rest, column) = frame.take_column(name)?;
                let indicators = self.one_hot_encode(name, &column);
                debug!("One-hot `{name}` into {} indicator columns", indicators.len());
                frame = indicators
                    .into_iter()
                    .try_fold(rest, |f, (indicator, values)| f.with_column(indicator, values))?;
            } else {
                let encoded = Self::label_encode(&frame.column(name)?);
                frame = frame.with_column(name.as_str(), encoded)?;
            }
        }

        if frame.height() != height {
            return Err(PipelineError::DataInvariant(format!(
                "encoding changed row count from {height} to {}",
                frame.height()
            )));
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[Option<&str>]) -> Column {
        Column::Text(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_label_encoding_sorted_codes() -> Result<()> {
        let frame = Frame::from_columns(vec![(
            "Type",
            text(&[Some("宅地"), Some("中古"), None, Some("宅地")]),
        )])?;
        let encoded = CategoryEncoder::default().encode(frame, &["Type".to_string()])?;
        // "中古" sorts before "宅地"
        assert_eq!(
            encoded.numeric("Type")?,
            &[Some(1.0), Some(0.0), None, Some(1.0)]
        );
        Ok(())
    }

    #[test]
    fn test_numeric_column_label_encoded_in_numeric_order() -> Result<()> {
        let frame = Frame::from_columns(vec![(
            "Area",
            Column::Numeric(vec![
                Some(100.0),
                Some(25.0),
                Some(3000.0),
                None,
                Some(5.0),
                Some(25.0),
            ]),
        )])?;
        let encoded = CategoryEncoder::default().encode(frame, &["Area".to_string()])?;
        assert_eq!(
            encoded.numeric("Area")?,
            &[Some(2.0), Some(1.0), Some(3.0), None, Some(0.0), Some(1.0)]
        );
        Ok(())
    }

    #[test]
    fn test_negative_and_fractional_codes_follow_value_order() -> Result<()> {
        let frame = Frame::from_columns(vec![(
            "BuildingYear",
            Column::Numeric(vec![Some(1.5), Some(-10.0), Some(1.25), Some(0.0)]),
        )])?;
        let encoded = CategoryEncoder::default().encode(frame, &["BuildingYear".to_string()])?;
        assert_eq!(
            encoded.numeric("BuildingYear")?,
            &[Some(3.0), Some(0.0), Some(2.0), Some(1.0)]
        );
        Ok(())
    }

    #[test]
    fn test_one_hot_multi_label() -> Result<()> {
        let frame = Frame::from_columns(vec![
            ("Use", text(&[Some("住宅、店舗"), Some("住宅"), None])),
            ("area", Column::Numeric(vec![Some(1.0), Some(2.0), Some(3.0)])),
        ])?;
        let encoder = CategoryEncoder::new(["Use"], "、");
        let encoded = encoder.encode(frame, &["Use".to_string()])?;

        assert!(!encoded.has_column("Use"));
        assert_eq!(encoded.numeric("Use_住宅")?, &[Some(1.0), Some(1.0), Some(0.0)]);
        assert_eq!(encoded.numeric("Use_店舗")?, &[Some(1.0), Some(0.0), Some(0.0)]);
        assert_eq!(encoded.height(), 3);
        Ok(())
    }

    #[test]
    fn test_absent_column_is_schema_error() {
        let frame = Frame::from_columns(vec![("a", text(&[Some("x")]))]).unwrap();
        let result = CategoryEncoder::default().encode(frame, &["b".to_string()]);
        assert!(matches!(result, Err(PipelineError::Schema { .. })));
    }
}
