//! Land-price feature assembly
//!
//! Joins transaction records with aggregates of the public land-price survey
//! and produces numeric train/test frames for regression.
//!
//! Modules:
//! - `frame`: polars-backed columnar table shared by every stage
//! - `io`: CSV ingestion
//! - `config`: TOML run configuration and YAML rename dictionary
//! - `text`: municipality and address normalization
//! - `land_price`: reference table preparation
//! - `join`: key-fallback join with ordered backfill
//! - `encode`: categorical encoding
//! - `assemble`: train/test stacking, joining, encoding and re-splitting

pub mod assemble;
pub mod config;
pub mod encode;
pub mod errors;
pub mod frame;
pub mod io;
pub mod join;
pub mod land_price;
pub mod text;

use tracing::info;

pub use assemble::{AssembledDataset, DatasetAssembler, TEST_SENTINEL};
pub use config::{ColumnRenames, PipelineConfig};
pub use encode::{CategoricalEncoder, CategoryEncoder};
pub use errors::{PipelineError, Result};
pub use frame::{Column, Frame};
pub use io::{read_csv, CsvOptions};
pub use join::{JoinKeyHierarchy, KeyAggregate, KeyFallbackJoiner};
pub use land_price::LandPricePreparer;
pub use text::TextNormalizer;

/// Raw input tables of one run
#[derive(Debug, Clone)]
pub struct RawTables {
    pub train: Frame,
    pub test: Frame,
    pub land_price: Frame,
}

impl RawTables {
    /// Read the three CSV files named in the configuration.
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let plain = CsvOptions::default();
        let reference = CsvOptions::with_text_columns(config.data.land_price_text_columns.iter().cloned());

        let tables = Self {
            train: read_csv(&config.data.train_file, &plain)?,
            test: read_csv(&config.data.test_file, &plain)?,
            land_price: read_csv(&config.data.land_price_file, &reference)?,
        };
        info!(
            "Loaded train={} test={} land_price={} rows",
            tables.train.height(),
            tables.test.height(),
            tables.land_price.height()
        );
        Ok(tables)
    }
}

/// Run every feature stage on already loaded tables.
///
/// Order: reference preparation and text normalization on the original column
/// names, then the global rename dictionary on all tables, then assembly.
pub fn build_dataset(
    config: &PipelineConfig,
    renames: &ColumnRenames,
    tables: RawTables,
) -> Result<AssembledDataset> {
    let normalizer = TextNormalizer::new(config.text.clone());
    let preparer = LandPricePreparer::new(config.land_price.clone());

    let land_price = preparer.prepare(tables.land_price)?;
    let land_price = normalizer.normalize_reference(land_price)?.rename(renames.as_map())?;
    let train = normalizer.normalize_transactions(tables.train)?.rename(renames.as_map())?;
    let test = normalizer.normalize_transactions(tables.test)?.rename(renames.as_map())?;

    let assembler = DatasetAssembler::new(
        config.columns.clone(),
        KeyFallbackJoiner::from_config(&config.join)?,
        CategoryEncoder::from_config(&config.encoding),
        CategoryEncoder::columns_from_config(&config.encoding),
    );
    assembler.assemble(train, test, &land_price)
}

/// Load the configured files and build the dataset.
pub fn build_dataset_from_files(config: &PipelineConfig) -> Result<AssembledDataset> {
    let renames = match &config.data.rename_file {
        Some(path) => ColumnRenames::from_yaml_file(path)?,
        None => ColumnRenames::default(),
    };
    build_dataset(config, &renames, RawTables::load(config)?)
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
