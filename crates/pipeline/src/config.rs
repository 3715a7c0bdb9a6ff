//! Run configuration
//!
//! Every component receives its section of [`PipelineConfig`] at
//! construction; nothing is read from process-wide state. The file format is
//! TOML, with the global column-rename dictionary kept in a separate YAML file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::{PipelineError, Result};

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input file locations
    pub data: DataConfig,
    /// Target, identifier and dropped columns
    pub columns: ColumnConfig,
    /// Reference table preparation
    pub land_price: LandPriceConfig,
    /// Address and municipality name cleanup
    pub text: TextConfig,
    /// Key-fallback join
    pub join: JoinConfig,
    /// Categorical encoding
    pub encoding: EncodingConfig,
    /// Gradient boosting hyperparameters
    pub model: ModelConfig,
    /// Cross-validation and early stopping
    pub cv: CvConfig,
    /// Run log directory and submission output
    pub output: OutputConfig,
}

/// Input file locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    pub land_price_file: PathBuf,
    /// YAML mapping original column name -> canonical name
    pub rename_file: Option<PathBuf>,
    /// Reference columns read as text even when they look numeric
    pub land_price_text_columns: Vec<String>,
}

/// Target, identifier and dropped columns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnConfig {
    pub target: String,
    pub id: String,
    /// Columns removed from the unified frame before encoding
    pub drop: Vec<String>,
}

/// Reference table preparation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LandPriceConfig {
    /// Reference-table renames into the transaction vocabulary, applied first
    pub renames: BTreeMap<String, String>,
    pub station_distance: String,
    pub station_minutes: String,
    pub minutes_divisor: f64,
    pub minutes_cap: f64,
    pub frontage_ratio: String,
    pub depth_ratio: String,
    pub ratio_min: f64,
    pub ratio_max: f64,
    pub frontage: String,
    pub area: String,
    pub area_max: f64,
    /// Most recent annual price; rescaled into `price_column`
    pub latest_price: String,
    pub price_divisor: f64,
    pub price_column: String,
    /// Last five annual prices averaged into `recent_mean_column`
    pub recent_prices: Vec<String>,
    pub recent_mean_column: String,
    pub survey_year_column: String,
    pub survey_year: f64,
    pub city_planning: String,
    /// Ordered substring expansions for zoning abbreviations
    pub zoning_abbreviations: Vec<(String, String)>,
}

/// Address and municipality name cleanup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    pub municipality_name: String,
    pub district_name: String,
    /// Residential address in the reference table
    pub address: String,
    /// Derived district key written to both tables
    pub district_detail: String,
    /// Number of characters kept in the district key
    pub detail_length: usize,
}

/// Key-fallback join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JoinConfig {
    /// Join keys ordered finest -> coarsest
    pub keys: Vec<String>,
    /// Reference column averaged per key
    pub value_column: String,
}

/// Categorical encoding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncodingConfig {
    /// Label-encoded columns
    pub categorical: Vec<String>,
    /// Multi-label columns expanded into indicator columns
    pub one_hot: Vec<String>,
    pub delimiter: String,
}

/// Gradient boosting hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub learning_rate: f64,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub subsample: f64,
    pub reg_lambda: f64,
    /// Maximum candidate thresholds per feature and node
    pub max_bins: usize,
    pub seed: i64,
}

/// Cross-validation and early stopping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CvConfig {
    pub n_splits: usize,
    pub early_stopping_rounds: usize,
    /// Log the validation score every this many rounds (0 disables)
    pub verbose_eval: usize,
}

/// Run log directory and submission output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub log_root: PathBuf,
    pub timestamp_format: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_file: PathBuf::from("resources/train_data.csv"),
            test_file: PathBuf::from("resources/test_data.csv"),
            land_price_file: PathBuf::from("resources/published_land_price.csv"),
            rename_file: Some(PathBuf::from("settings/column_names.yml")),
            land_price_text_columns: vec!["利用の現況".to_string()],
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            target: "y".to_string(),
            id: "id".to_string(),
            drop: vec![
                "id".to_string(),
                "Prefecture".to_string(),
                "Municipality".to_string(),
                "FloorPlan".to_string(),
            ],
        }
    }
}

impl Default for LandPriceConfig {
    fn default() -> Self {
        let renames = [
            ("所在地コード", "市区町村コード"),
            ("建蔽率", "建ぺい率（％）"),
            ("容積率", "容積率（％）"),
            ("駅名", "最寄駅：名称"),
            ("地積", "面積（㎡）"),
            ("前面道路の幅員", "前面道路：幅員（ｍ）"),
            ("前面道路の方位区分", "前面道路：方位"),
            ("前面道路区分", "前面道路：種類"),
            ("形状区分", "土地の形状"),
            ("用途区分", "都市計画"),
            ("用途", "地域"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        let zoning_abbreviations = [
            ("1低専", "第１種低層住居専用地域"),
            ("2低専", "第２種低層住居専用地域"),
            ("1中専", "第１種中高層住居専用地域"),
            ("2中専", "第２種中高層住居専用地域"),
            ("1住居", "第１種住居地域"),
            ("2住居", "第２種住居地域"),
            ("準住居", "準住居地域"),
            ("商業", "商業地域"),
            ("近商", "近隣商業地域"),
            ("工業", "工業地域"),
            ("工専", "工業専用地域"),
            ("準工", "準工業地域"),
            ("田園住", "田園住居地域"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        Self {
            renames,
            station_distance: "駅距離".to_string(),
            station_minutes: "最寄駅：距離（分）".to_string(),
            minutes_divisor: 50.0,
            minutes_cap: 120.0,
            frontage_ratio: "間口（比率）".to_string(),
            depth_ratio: "奥行（比率）".to_string(),
            ratio_min: 10.0,
            ratio_max: 100.0,
            frontage: "間口".to_string(),
            area: "面積（㎡）".to_string(),
            area_max: 3000.0,
            latest_price: "Ｈ３１価格".to_string(),
            price_divisor: 100_000.0,
            price_column: "land_price".to_string(),
            recent_prices: ["Ｈ２７価格", "Ｈ２８価格", "Ｈ２９価格", "Ｈ３０価格", "Ｈ３１価格"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            recent_mean_column: "landp_mean".to_string(),
            survey_year_column: "取引時点".to_string(),
            survey_year: 2019.0,
            city_planning: "都市計画".to_string(),
            zoning_abbreviations,
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            municipality_name: "市区町村名".to_string(),
            district_name: "地区名".to_string(),
            address: "住居表示".to_string(),
            district_detail: "地区詳細".to_string(),
            detail_length: 5,
        }
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            keys: vec![
                "地区詳細".to_string(),
                "MunicipalityCode".to_string(),
                "NearestStation".to_string(),
            ],
            value_column: "land_price".to_string(),
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            categorical: [
                "Type",
                "Region",
                "MunicipalityCode",
                "DistrictName",
                "NearestStation",
                "TimeToNearestStation",
                "LandShape",
                "Frontage",
                "Area",
                "TotalFloorArea",
                "BuildingYear",
                "Purpose",
                "Direction",
                "Classification",
                "CityPlanning",
                "Renovation",
                "Period",
                "地区詳細",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            one_hot: vec![
                "Structure".to_string(),
                "Use".to_string(),
                "Remarks".to_string(),
            ],
            delimiter: "、".to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.007,
            n_estimators: 30_000,
            max_depth: 5,
            min_samples_leaf: 80,
            subsample: 0.8,
            reg_lambda: 0.0,
            max_bins: 255,
            seed: 42,
        }
    }
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            n_splits: 4,
            early_stopping_rounds: 100,
            verbose_eval: 5000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from("resources/logs/gbdt"),
            timestamp_format: "%Y%m%d_%H%M%S".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {e}")))?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Check the configuration.
    ///
    /// Inconsistencies that make a run impossible are errors; questionable but
    /// runnable settings come back as warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.join.keys.is_empty() {
            return Err(PipelineError::Config("join.keys must not be empty".into()));
        }
        if self.cv.n_splits < 2 {
            return Err(PipelineError::Config(format!(
                "cv.n_splits must be at least 2, got {}",
                self.cv.n_splits
            )));
        }
        if !(self.model.learning_rate > 0.0) {
            return Err(PipelineError::Config(
                "model.learning_rate must be positive".into(),
            ));
        }
        if !(self.model.subsample > 0.0 && self.model.subsample <= 1.0) {
            return Err(PipelineError::Config(
                "model.subsample must be in (0, 1]".into(),
            ));
        }
        if self.land_price.price_divisor == 0.0 || self.land_price.minutes_divisor == 0.0 {
            return Err(PipelineError::Config("divisors must be non-zero".into()));
        }

        let mut warnings = Vec::new();

        if self.cv.early_stopping_rounds == 0 {
            warnings.push("Early stopping disabled; every fold runs all rounds".to_string());
        }

        if self.land_price.recent_prices.is_empty() {
            warnings.push("No recent price columns; recent price mean will be null".to_string());
        }

        for column in &self.encoding.one_hot {
            if self.encoding.categorical.contains(column) {
                warnings.push(format!(
                    "Column `{column}` is listed as both categorical and one-hot"
                ));
            }
        }

        for key in &self.join.keys {
            if self.columns.drop.contains(key) && !self.encoding.categorical.contains(key) {
                warnings.push(format!("Join key `{key}` is dropped before encoding"));
            }
        }

        if warnings.is_empty() {
            info!("Configuration validation passed");
        } else {
            warn!("Configuration validation warnings: {:?}", warnings);
        }

        Ok(warnings)
    }
}

/// Global column-rename dictionary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnRenames(pub BTreeMap<String, String>);

impl ColumnRenames {
    /// Load the mapping from a YAML file of `original: canonical` pairs
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let renames = Self::from_yaml_str(&content)?;
        info!("Loaded {} column renames from {}", renames.0.len(), path.display());
        Ok(renames)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse rename dictionary: {e}")))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}
