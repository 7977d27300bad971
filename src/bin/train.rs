//! `train` binary: entry point for the pose-graph violence training pipeline.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin train -- --data-dir json --sample-percentage 100
//! cargo run --bin train -- --config config.json --cuda
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use pose_violence_train::config::TrainingConfig;
use pose_violence_train::device::SystemProbe;
use pose_violence_train::pipeline;

/// Command-line arguments for the training binary.
#[derive(Parser, Debug)]
#[command(
    name = "train",
    version,
    about = "Train a pose-graph violence classifier and calibrate its threshold",
    long_about = None
)]
struct Args {
    /// Path to a JSON configuration file.
    ///
    /// If not provided, the default `TrainingConfig` is used.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the keypoint data directory.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Override the percentage of files processed per directory (1-100).
    #[arg(long, value_name = "P")]
    sample_percentage: Option<u32>,

    /// Override the number of epochs.
    #[arg(long)]
    epochs: Option<usize>,

    /// Override the batch size.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the learning rate.
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Override the random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override where the model artifact is written.
    #[arg(long, value_name = "FILE")]
    artifact: Option<PathBuf>,

    /// Override the directory receiving visualization data.
    #[arg(long, value_name = "DIR")]
    report_dir: Option<PathBuf>,

    /// Train on a CUDA device when one is available (overrides config `use_gpu`).
    #[arg(long, default_value_t = false)]
    cuda: bool,

    /// Disable progress bars.
    #[arg(long, default_value_t = false)]
    no_progress: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply_overrides(&self, config: &mut TrainingConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(p) = self.sample_percentage {
            config.sample_percentage = p;
        }
        if let Some(n) = self.epochs {
            config.num_epochs = n;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(lr) = self.learning_rate {
            config.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(path) = &self.artifact {
            config.artifact_path = path.clone();
        }
        if let Some(dir) = &self.report_dir {
            config.report_dir = dir.clone();
        }
        if self.cuda {
            config.use_gpu = true;
        }
    }
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("Pose-graph violence training pipeline v{}", pose_violence_train::VERSION);

    if let Err(e) = run(&args) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            TrainingConfig::from_json(path).context("failed to load configuration")?
        }
        None => {
            info!("No configuration file provided; using defaults");
            TrainingConfig::default()
        }
    };
    args.apply_overrides(&mut config);
    config.validate().context("configuration validation failed")?;

    info!("Configuration validated successfully");
    info!("  data dir     : {}", config.data_dir.display());
    info!("  cameras      : {}", config.cameras.join(", "));
    info!("  sample pct   : {}%", config.sample_percentage);
    info!("  batch size   : {}", config.batch_size);
    info!("  learning rate: {}", config.learning_rate);
    info!("  epochs       : {}", config.num_epochs);
    info!("  hidden       : {} ({} heads, {} layers)", config.hidden_channels, config.attention_heads, config.attention_layers);
    info!("  seed         : {}", config.seed);

    let summary = pipeline::run(&config, &SystemProbe, !args.no_progress)
        .context("training run failed")?;

    let (train, val, test) = summary.split_sizes;
    info!("Samples: train={train} val={val} test={test}");
    info!(
        "Test Loss: {:.4}, Test AUC: {:.4}, threshold: {:.4}",
        summary.evaluation.loss,
        summary.evaluation.auc,
        summary.evaluation.threshold()
    );
    info!("Model artifact: {}", config.artifact_path.display());
    for path in &summary.handoff_files {
        info!("Visualization data: {}", path.display());
    }
    Ok(())
}
