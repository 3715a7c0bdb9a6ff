//! Land-price GBDT trainer CLI
//!
//! Assembles the feature set, runs cross-validated training and writes the
//! submission into a timestamped run directory.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use landprice_pipeline::{build_dataset_from_files, PipelineConfig};
use landprice_trainer::{train_and_submit, RunStamp};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "landprice-train")]
#[command(author = "Landprice Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cross-validated GBDT training for land transaction prices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build features, train every fold and write the submission
    Run(RunArgs),
    /// Load and validate the configuration without training
    CheckConfig(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the train, test and land-price CSV files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Root directory for run logs and submissions
    #[arg(long)]
    log_root: Option<PathBuf>,

    /// Number of cross-validation folds
    #[arg(long)]
    n_splits: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let args = match &cli.command {
        Command::Run(run) => &run.config,
        Command::CheckConfig(args) => args,
    };

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Land-price GBDT trainer v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args)?;
    for warning in config.validate().context("Invalid configuration")? {
        warn!("{warning}");
    }

    match cli.command {
        Command::CheckConfig(_) => {
            info!("Configuration OK");
            info!("  Train: {}", config.data.train_file.display());
            info!("  Test: {}", config.data.test_file.display());
            info!("  Land price: {}", config.data.land_price_file.display());
            info!("  Join keys: {}", config.join.keys.join(" > "));
            info!("  Folds: {}", config.cv.n_splits);
            Ok(())
        }
        Command::Run(_) => run(&config),
    }
}

fn run(config: &PipelineConfig) -> Result<()> {
    // One stamp per run names both the log directory and the submission
    let stamp = RunStamp::now(&config.output.timestamp_format);
    info!("Run {}", stamp.as_str());

    let dataset = build_dataset_from_files(config).context("Failed to assemble dataset")?;
    info!(
        "Dataset: {} train rows, {} test rows, {} features",
        dataset.train.height(),
        dataset.test.height(),
        dataset.train.width()
    );

    let summary = train_and_submit(config, &dataset, &stamp).context("Training failed")?;

    info!("Training completed");
    for fold in &summary.folds {
        info!(
            "  Fold {}: rmse {:.6} (best iteration {})",
            fold.fold + 1,
            fold.rmse,
            fold.best_iteration
        );
    }
    info!("  CV rmse: {:.6}", summary.score);
    info!("  Logs: {}", summary.log_dir.display());
    info!("  Submission: {}", summary.submission_path.display());

    Ok(())
}

fn load_config(args: &ConfigArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(dir) = &args.data_dir {
        config.data.train_file = rebase(&config.data.train_file, dir);
        config.data.test_file = rebase(&config.data.test_file, dir);
        config.data.land_price_file = rebase(&config.data.land_price_file, dir);
    }
    if let Some(root) = &args.log_root {
        config.output.log_root = root.clone();
    }
    if let Some(n_splits) = args.n_splits {
        config.cv.n_splits = n_splits;
    }

    Ok(config)
}

/// Keep the file name, replace the directory
fn rebase(path: &Path, dir: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => dir.join(name),
        None => dir.to_path_buf(),
    }
}
