//! discharge-net command line
//!
//! - `discharge-net train --config run.json [--epochs N]` - train and evaluate
//! - `discharge-net predict --config run.json` - score `predict_dir` into a submission CSV
//! - `discharge-net inspect <dir>` - decode a record directory and summarise it

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use discharge_net::config::TrainConfig;
use discharge_net::driver::{write_submission, Driver};
use burn::tensor::backend::Backend;
use discharge_net::model::{Classifier, ConvClassifier, ConvNetSpec, TrainBackend};
use discharge_net::pipeline::InputPipeline;
use discharge_net::record::LabelPolicy;
use discharge_net::storage::{discover_record_files, RecordStore};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Partial discharge classifier over power-line spectrograms
#[derive(Parser)]
#[command(name = "discharge-net")]
#[command(about = "Train and score a partial discharge classifier", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train with per-epoch evaluation, scoring and plotting
    Train {
        /// JSON config file (defaults apply to missing fields)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the number of epochs
        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Write a submission CSV for `predict_dir` using the saved model
    Predict {
        /// JSON config file
        #[arg(long)]
        config: PathBuf,
    },

    /// Decode every record in a directory and print a summary
    Inspect {
        /// Record directory
        #[arg(name = "DIR")]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train { config, epochs } => train(config.as_deref(), epochs),
        Commands::Predict { config } => predict(&config),
        Commands::Inspect { dir } => inspect(&dir),
    }
}

fn load_config(path: Option<&Path>) -> Result<TrainConfig> {
    match path {
        Some(path) => TrainConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(TrainConfig::default()),
    }
}

/// Reference network, warm-started from `model_dir` when a checkpoint exists.
fn load_model(config: &TrainConfig) -> Result<ConvClassifier<TrainBackend>> {
    TrainBackend::seed(config.shuffle_seed);
    ConvClassifier::load_or_new(
        &config.model_dir,
        ConvNetSpec::default(),
        config.learning_rate,
        Default::default(),
    )
    .with_context(|| format!("loading model from {}", config.model_dir.display()))
}

fn train(config: Option<&Path>, epochs: Option<usize>) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(epochs) = epochs {
        config.num_epochs = epochs;
    }

    let model = load_model(&config)?;
    let mut driver = Driver::new(config, model);
    let summary = driver.run().context("training run failed")?;

    println!();
    println!("Epochs completed: {}", summary.epochs);
    if let Some(last) = &summary.last {
        println!(
            "Final: loss {:.4}  accuracy {:.4}  MCC {:.4}",
            last.loss(),
            last.accuracy(),
            last.mcc()
        );
    }
    if let Some(best) = &summary.best {
        println!("Best MCC {:.4} at epoch {}", best.mcc(), best.epoch());
    }
    if let Some(rows) = summary.submission_rows {
        println!("Submission rows: {rows}");
    }
    println!("History: {}", driver.history_path().display());
    Ok(())
}

fn predict(config: &Path) -> Result<()> {
    let config = load_config(Some(config))?;
    let (Some(dir), Some(out)) = (&config.predict_dir, &config.submission_path) else {
        bail!("predict needs both predict_dir and submission_path in the config");
    };

    let model = load_model(&config)?;
    if model.steps() == 0 {
        bail!(
            "no trained model in {}; run `discharge-net train` first",
            config.model_dir.display()
        );
    }

    let dataset = InputPipeline::new(dir, config.batch_size)
        .labels(LabelPolicy::Optional)
        .build()
        .with_context(|| format!("reading records from {}", dir.display()))?;
    let predictions = model.predict(dataset.batches())?;
    write_submission(out, &predictions, config.threshold)
        .with_context(|| format!("writing {}", out.display()))?;

    info!(rows = predictions.len(), path = %out.display(), "submission written");
    println!("Wrote {} predictions to {}", predictions.len(), out.display());
    Ok(())
}

fn inspect(dir: &Path) -> Result<()> {
    let files = discover_record_files(dir)?;
    let records = RecordStore::load_dir(dir)
        .and_then(|store| store.decode(LabelPolicy::Optional))
        .with_context(|| format!("decoding {}", dir.display()))?;

    let labelled = records.iter().filter(|r| r.label().is_some()).count();
    let positives = records.iter().filter(|r| r.label() == Some(1)).count();
    let measurements: BTreeSet<i64> = records.iter().map(|r| r.measurement_id()).collect();

    println!("Directory:    {}", dir.display());
    println!("Files:        {}", files.len());
    println!("Records:      {}", records.len());
    println!("Measurements: {}", measurements.len());
    println!("Labelled:     {labelled}");
    println!("Positives:    {positives}");
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        println!("Signal IDs:   {}..={}", first.signal_id(), last.signal_id());
    }
    Ok(())
}
