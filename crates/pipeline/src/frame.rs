//! Columnar in-memory table used by every pipeline stage
//!
//! [`Frame`] wraps a polars [`DataFrame`]. Stages take a frame by value and
//! return a new one, so the order in which columns are produced is visible in
//! the calling code rather than hidden in shared mutable state.
//!
//! Cells cross the frame boundary as [`Column`] values: `Float64` series come
//! out as [`Column::Numeric`], `String` series as [`Column::Text`]. Other
//! numeric dtypes are cast to `f64` on the way out.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::{DataFrame, DataType, IdxCa, IdxSize, NamedFrom, PlSmallStr, Series};

use crate::errors::{PipelineError, Result};

/// A single typed column. Nulls are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            Column::Numeric(values) => values.iter().filter(|v| v.is_none()).count(),
            Column::Text(values) => values.iter().filter(|v| v.is_none()).count(),
        }
    }

    /// Canonical string form of every cell, used as join or category keys.
    ///
    /// Integral numbers render without a fractional part so that a numeric
    /// `13101` in one table matches a text `"13101"` in another.
    pub fn keys(&self) -> Vec<Option<String>> {
        match self {
            Column::Numeric(values) => values.iter().map(|v| v.map(format_number)).collect(),
            Column::Text(values) => values.clone(),
        }
    }

    fn into_text(self) -> Vec<Option<String>> {
        match self {
            Column::Numeric(values) => values.into_iter().map(|v| v.map(format_number)).collect(),
            Column::Text(values) => values,
        }
    }

    fn into_series(self, name: &str) -> Series {
        match self {
            Column::Numeric(values) => Series::new(name.into(), values.as_slice()),
            Column::Text(values) => Series::new(name.into(), values.as_slice()),
        }
    }

    fn from_series(series: &Series) -> Result<Self> {
        if series.dtype() == &DataType::String {
            let values = series
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            return Ok(Column::Text(values));
        }

        let numbers = series.cast(&DataType::Float64)?;
        let values = numbers.f64()?.into_iter().collect();
        Ok(Column::Numeric(values))
    }
}

/// Render a number the way it is used for keys and category labels.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    data: DataFrame,
}

impl Frame {
    /// Create an empty frame with no columns and no rows
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame from named columns, checking lengths and name uniqueness.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Column)>) -> Result<Self> {
        let mut frame = Frame::new();
        for (name, column) in columns {
            let name = name.into();
            if frame.has_column(&name) {
                return Err(PipelineError::DataInvariant(format!(
                    "duplicate column `{name}`"
                )));
            }
            frame = frame.with_column(name, column)?;
        }
        Ok(frame)
    }

    pub fn as_dataframe(&self) -> &DataFrame {
        &self.data
    }

    pub fn into_dataframe(self) -> DataFrame {
        self.data
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    pub fn width(&self) -> usize {
        self.data.width()
    }

    pub fn names(&self) -> Vec<String> {
        self.data
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.data.get_column_index(name).is_some()
    }

    /// Every `(name, column)` pair in column order
    pub fn columns(&self) -> Result<Vec<(String, Column)>> {
        self.data
            .get_columns()
            .iter()
            .map(|c| Ok((c.name().to_string(), Column::from_series(c.as_materialized_series())?)))
            .collect()
    }

    /// First column still holding text, if any.
    pub fn first_text_column(&self) -> Option<String> {
        self.data
            .get_columns()
            .iter()
            .find(|c| c.dtype() == &DataType::String)
            .map(|c| c.name().to_string())
    }

    fn series(&self, name: &str) -> Result<&Series> {
        self.data
            .column(name)
            .map(|c| c.as_materialized_series())
            .map_err(|_| PipelineError::missing(name, "is not present in the frame"))
    }

    pub fn column(&self, name: &str) -> Result<Column> {
        Column::from_series(self.series(name)?)
    }

    pub fn numeric(&self, name: &str) -> Result<Vec<Option<f64>>> {
        match self.column(name)? {
            Column::Numeric(values) => Ok(values),
            Column::Text(_) => Err(PipelineError::missing(name, "is not numeric")),
        }
    }

    pub fn text(&self, name: &str) -> Result<Vec<Option<String>>> {
        match self.column(name)? {
            Column::Text(values) => Ok(values),
            Column::Numeric(_) => Err(PipelineError::missing(name, "is not a text column")),
        }
    }

    /// Insert or replace a column. The first column of an empty frame sets the height.
    pub fn with_column(self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if self.width() > 0 && column.len() != self.height() {
            return Err(PipelineError::DataInvariant(format!(
                "column `{name}` has {} rows, frame has {}",
                column.len(),
                self.height()
            )));
        }

        let mut data = self.data;
        data.with_column(column.into_series(&name))?;
        Ok(Self { data })
    }

    /// Remove a column and hand it back to the caller.
    pub fn take_column(self, name: &str) -> Result<(Self, Column)> {
        if !self.has_column(name) {
            return Err(PipelineError::missing(name, "cannot be removed: not present"));
        }
        let mut data = self.data;
        let removed = data.drop_in_place(name)?;
        let column = Column::from_series(removed.as_materialized_series())?;
        Ok((Self { data }, column))
    }

    /// Drop every listed column; all of them must exist.
    pub fn drop_columns(self, names: &[String]) -> Result<Self> {
        names
            .iter()
            .try_fold(self, |frame, name| frame.take_column(name).map(|(f, _)| f))
    }

    /// Rename columns present in `mapping`; names not in the frame are ignored.
    ///
    /// Fails without renaming anything when two columns would end up with the
    /// same name.
    pub fn rename(self, mapping: &BTreeMap<String, String>) -> Result<Self> {
        let renamed: Vec<String> = self
            .names()
            .into_iter()
            .map(|name| mapping.get(&name).cloned().unwrap_or(name))
            .collect();

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = renamed.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(PipelineError::DataInvariant(format!(
                "renaming produces duplicate column `{duplicate}`"
            )));
        }

        let mut data = self.data;
        data.set_column_names(renamed.iter().map(|name| PlSmallStr::from(name.as_str())))?;
        Ok(Self { data })
    }

    /// Gather rows by index into a new frame.
    pub fn take_rows(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&bad) = rows.iter().find(|&&row| row >= self.height()) {
            return Err(PipelineError::DataInvariant(format!(
                "row {bad} is out of bounds for a frame of {} rows",
                self.height()
            )));
        }
        let indices = IdxCa::from_vec(
            "rows".into(),
            rows.iter().map(|&row| row as IdxSize).collect(),
        );
        Ok(Self {
            data: self.data.take(&indices)?,
        })
    }

    /// Stack `other` below `self`.
    ///
    /// Columns are the union of both frames, ordered as in `self` followed by
    /// the ones only `other` has. A column missing on one side is null there.
    /// A column that is numeric on one side and text on the other becomes text.
    pub fn concat(self, other: Frame) -> Result<Self> {
        if self.width() == 0 {
            return Ok(other);
        }
        if other.width() == 0 {
            return Ok(self);
        }

        let mut names = self.names();
        names.extend(other.names().into_iter().filter(|n| !self.has_column(n)));

        let mut top: Vec<polars::prelude::Column> = Vec::with_capacity(names.len());
        let mut bottom: Vec<polars::prelude::Column> = Vec::with_capacity(names.len());
        for name in &names {
            let (upper, lower) = aligned_pair(&self, &other, name)?;
            top.push(upper.into());
            bottom.push(lower.into());
        }

        let mut stacked = DataFrame::new(top)?;
        stacked.vstack_mut(&DataFrame::new(bottom)?)?;
        Ok(Self { data: stacked })
    }
}

/// The two halves of `name` for a vertical stack, with matching dtypes.
fn aligned_pair(top: &Frame, bottom: &Frame, name: &str) -> Result<(Series, Series)> {
    let upper = top.series(name).ok();
    let lower = bottom.series(name).ok();

    match (upper, lower) {
        (Some(u), Some(l)) if u.dtype() == l.dtype() => Ok((u.clone(), l.clone())),
        (Some(u), Some(l)) => {
            let u = Column::Text(Column::from_series(u)?.into_text());
            let l = Column::Text(Column::from_series(l)?.into_text());
            Ok((u.into_series(name), l.into_series(name)))
        }
        (Some(u), None) => {
            let nulls = Series::full_null(name.into(), bottom.height(), u.dtype());
            Ok((u.clone(), nulls))
        }
        (None, Some(l)) => {
            let nulls = Series::full_null(name.into(), top.height(), l.dtype());
            Ok((nulls, l.clone()))
        }
        (None, None) => Err(PipelineError::missing(name, "is in neither frame")),
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        match (self.columns(), other.columns()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl From<DataFrame> for Frame {
    fn from(data: DataFrame) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::from_columns(vec![
            ("code", Column::Numeric(vec![Some(13101.0), Some(13102.0)])),
            (
                "district",
                Column::Text(vec![Some("千代田".to_string()), None]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_rejects_ragged() {
        let result = Frame::from_columns(vec![
            ("a", Column::Numeric(vec![Some(1.0)])),
            ("b", Column::Numeric(vec![Some(1.0), Some(2.0)])),
        ]);
        assert!(matches!(result, Err(PipelineError::DataInvariant(_))));
    }

    #[test]
    fn test_from_columns_rejects_duplicates() {
        let result = Frame::from_columns(vec![
            ("a", Column::Numeric(vec![Some(1.0)])),
            ("a", Column::Numeric(vec![Some(2.0)])),
        ]);
        assert!(matches!(result, Err(PipelineError::DataInvariant(_))));
    }

    #[test]
    fn test_keys_format_integral_numbers() -> Result<()> {
        let frame = sample();
        assert_eq!(
            frame.column("code")?.keys(),
            vec![Some("13101".to_string()), Some("13102".to_string())]
        );
        assert_eq!(frame.column("district")?.keys()[1], None);
        Ok(())
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let frame = sample();
        match frame.column("station") {
            Err(PipelineError::Schema { column, .. }) => assert_eq!(column, "station"),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_columns_round_trip_through_polars() -> Result<()> {
        let frame = sample();
        assert_eq!(frame.as_dataframe().shape(), (2, 2));
        let columns = frame.columns()?;
        assert_eq!(columns[0].0, "code");
        assert_eq!(columns[0].1, Column::Numeric(vec![Some(13101.0), Some(13102.0)]));
        assert_eq!(frame.first_text_column(), Some("district".to_string()));
        Ok(())
    }

    #[test]
    fn test_concat_unions_columns() -> Result<()> {
        let top = sample();
        let bottom = Frame::from_columns(vec![
            ("code", Column::Numeric(vec![Some(13103.0)])),
            ("y", Column::Numeric(vec![Some(-1.0)])),
        ])?;

        let all = top.concat(bottom)?;
        assert_eq!(all.height(), 3);
        assert_eq!(all.names(), &["code", "district", "y"]);
        assert_eq!(all.text("district")?[2], None);
        assert_eq!(all.numeric("y")?, &[None, None, Some(-1.0)]);
        assert_eq!(
            all.numeric("code")?,
            &[Some(13101.0), Some(13102.0), Some(13103.0)]
        );
        Ok(())
    }

    #[test]
    fn test_concat_mixed_types_become_text() -> Result<()> {
        let top = Frame::from_columns(vec![("code", Column::Numeric(vec![Some(13101.0)]))])?;
        let bottom =
            Frame::from_columns(vec![("code", Column::Text(vec![Some("13102".to_string())]))])?;

        let all = top.concat(bottom)?;
        assert_eq!(
            all.text("code")?,
            &[Some("13101".to_string()), Some("13102".to_string())]
        );
        Ok(())
    }

    #[test]
    fn test_rename_and_drop() -> Result<()> {
        let mapping = BTreeMap::from([
            ("code".to_string(), "MunicipalityCode".to_string()),
            ("absent".to_string(), "Ignored".to_string()),
        ]);
        let frame = sample().rename(&mapping)?;
        assert_eq!(frame.names(), &["MunicipalityCode", "district"]);

        let frame = frame.drop_columns(&["district".to_string()])?;
        assert_eq!(frame.width(), 1);
        assert!(frame.drop_columns(&["district".to_string()]).is_err());
        Ok(())
    }

    #[test]
    fn test_rename_rejects_colliding_names() {
        let mapping = BTreeMap::from([("code".to_string(), "district".to_string())]);
        assert!(matches!(
            sample().rename(&mapping),
            Err(PipelineError::DataInvariant(_))
        ));
    }

    #[test]
    fn test_rename_swaps_names() -> Result<()> {
        let mapping = BTreeMap::from([
            ("code".to_string(), "district".to_string()),
            ("district".to_string(), "code".to_string()),
        ]);
        let frame = sample().rename(&mapping)?;
        assert_eq!(frame.names(), &["district", "code"]);
        assert_eq!(frame.numeric("district")?, &[Some(13101.0), Some(13102.0)]);
        Ok(())
    }

    #[test]
    fn test_take_rows_preserves_order() -> Result<()> {
        let frame = sample().take_rows(&[1, 0, 1])?;
        assert_eq!(frame.height(), 3);
        assert_eq!(
            frame.numeric("code")?,
            &[Some(13102.0), Some(13101.0), Some(13102.0)]
        );
        assert!(sample().take_rows(&[2]).is_err());
        Ok(())
    }
}
