//! CSV ingestion into [`Frame`]s
//!
//! Column types are inferred: a column is numeric when every non-empty cell
//! parses as `f64`, otherwise it is text. Empty cells are nulls. Columns listed
//! in [`CsvOptions::text_columns`] are always read as text.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::errors::Result;
use crate::frame::{Column, Frame};

/// Reading options for a single table
#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    /// Columns forced to text even when every cell looks numeric
    pub text_columns: BTreeSet<String>,
}

impl CsvOptions {
    pub fn with_text_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text_columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Load a CSV file with a header row
pub fn read_csv<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<Frame> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let frame = read_csv_from_reader(file, options)?;
    debug!(
        "Read {} rows x {} columns from {}",
        frame.height(),
        frame.width(),
        path.display()
    );
    Ok(frame)
}

/// Load CSV data with a header row from any reader
pub fn read_csv_from_reader<R: Read>(reader: R, options: &CsvOptions) -> Result<Frame> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        for (i, column) in cells.iter_mut().enumerate() {
            let cell = record.get(i).filter(|c| !c.is_empty()).map(str::to_string);
            column.push(cell);
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| {
            let column = if options.text_columns.contains(&name) {
                Column::Text(values)
            } else {
                infer_column(values)
            };
            (name, column)
        })
        .collect();

    Frame::from_columns(columns)
}

fn infer_column(values: Vec<Option<String>>) -> Column {
    let parsed: Option<Vec<Option<f64>>> = values
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(text) => text.parse::<f64>().ok().map(Some),
        })
        .collect();

    match parsed {
        Some(numbers) => Column::Numeric(numbers),
        None => Column::Text(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_type_inference() -> Result<()> {
        let data = "id,code,name,area\n0,13101,千代田区,\n1,13102,中央区,120.5\n";
        let frame = read_csv_from_reader(data.as_bytes(), &CsvOptions::default())?;

        assert_eq!(frame.height(), 2);
        assert_eq!(frame.numeric("code")?, &[Some(13101.0), Some(13102.0)]);
        assert_eq!(frame.text("name")?[1], Some("中央区".to_string()));
        assert_eq!(frame.numeric("area")?, &[None, Some(120.5)]);
        Ok(())
    }

    #[test]
    fn test_forced_text_column() -> Result<()> {
        let data = "usage\n0010000\n1000000\n";
        let options = CsvOptions::with_text_columns(["usage"]);
        let frame = read_csv_from_reader(data.as_bytes(), &options)?;
        assert_eq!(frame.text("usage")?[0], Some("0010000".to_string()));
        Ok(())
    }

    #[test]
    fn test_read_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "a,b")?;
        writeln!(file, "1,x")?;
        file.flush()?;

        let frame = read_csv(file.path(), &CsvOptions::default())?;
        assert_eq!(frame.names(), &["a", "b"]);
        Ok(())
    }
}
