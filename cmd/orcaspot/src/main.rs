//! orcaspot - Detect orca calls in long recordings.
//!
//! Slides a fixed-length window over each input file, scores every window
//! with the classifier and logs one decision line per window:
//!
//! ```text
//! time=12.00-14.00, pred=1, prob=0.93
//! ```

mod output;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use orcaspot_detect::{Classifier, DetectOptions, Detector, Device, ModelConfig, NormalizationMode};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use output::{Output, OutputFormat};

/// Detect orca calls in audio recordings.
#[derive(Parser, Debug)]
#[command(name = "orcaspot")]
#[command(about = "Sliding-window orca call detection")]
#[command(version)]
struct Args {
    /// Trained model (ONNX)
    #[arg(long)]
    model: PathBuf,

    /// Model metadata file (default: <model>.json, .yaml or .yml next to the model)
    #[arg(long)]
    model_config: Option<PathBuf>,

    /// Run options file (YAML or JSON); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Audio files to process
    #[arg(required = true)]
    audio_files: Vec<PathBuf>,

    /// Window length in seconds
    #[arg(long)]
    sequence_len: Option<f64>,

    /// Window hop in seconds
    #[arg(long)]
    hop: Option<f64>,

    /// Probability threshold for a positive decision
    #[arg(long)]
    threshold: Option<f32>,

    /// Windows per inference call
    #[arg(long)]
    batch_size: Option<usize>,

    /// Concurrent window fetches
    #[arg(long)]
    num_workers: Option<usize>,

    /// Use per-window min-max normalization instead of 0/1-dB
    #[arg(long)]
    min_max_norm: bool,

    /// Run inference on the CPU only
    #[arg(long)]
    no_cuda: bool,

    /// Debug logging
    #[arg(long)]
    debug: bool,

    /// Also write logs to <LOG_DIR>/predict.log
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Write the report to a file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Report as JSON instead of YAML
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Run options: config file (or defaults) with flags applied on top.
    fn detect_options(&self) -> Result<DetectOptions> {
        let mut opts = match &self.config {
            Some(path) => DetectOptions::from_file(path)?,
            None => DetectOptions::default(),
        };
        if let Some(v) = self.sequence_len {
            opts.sequence_len = v;
        }
        if let Some(v) = self.hop {
            opts.hop = v;
        }
        if let Some(v) = self.threshold {
            opts.threshold = v;
        }
        if let Some(v) = self.batch_size {
            opts.batch_size = v;
        }
        if let Some(v) = self.num_workers {
            opts.num_workers = v;
        }
        if self.min_max_norm {
            opts.normalization = NormalizationMode::MinMax;
        }
        if self.no_cuda {
            opts.device = Device::Cpu;
        }
        Ok(opts)
    }
}

fn init_logging(debug: bool, log_dir: Option<&Path>) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log dir {}", dir.display()))?;
            let file = File::create(dir.join("predict.log"))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Finds the metadata file for `model`: explicit path, sidecar, or defaults.
fn load_model_config(model: &Path, explicit: Option<&Path>) -> Result<ModelConfig> {
    if let Some(path) = explicit {
        return Ok(ModelConfig::from_file(path)?);
    }
    for ext in ["json", "yaml", "yml"] {
        let sidecar = model.with_extension(ext);
        if sidecar.is_file() {
            info!(path = %sidecar.display(), "model config");
            return Ok(ModelConfig::from_file(&sidecar)?);
        }
    }
    warn!("no model config found; using default preprocessing options");
    Ok(ModelConfig::default())
}

#[cfg(feature = "onnx")]
fn load_model(path: &Path, device: Device) -> Result<Arc<dyn Classifier>> {
    let model = orcaspot_detect::OnnxClassifier::open(path, device)?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "onnx"))]
fn load_model(path: &Path, _device: Device) -> Result<Arc<dyn Classifier>> {
    anyhow::bail!(
        "cannot load {}: orcaspot was built without the `onnx` feature",
        path.display()
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.log_dir.as_deref())?;

    let options = args.detect_options()?;
    let model_config = load_model_config(&args.model, args.model_config.as_deref())?;
    let model = load_model(&args.model, options.device)?;
    let detector = Detector::new(model, model_config, options)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; stopping after the current file");
                cancel.cancel();
            }
        });
    }

    let reports = detector.detect_files(&args.audio_files, &cancel).await;

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    let positives: usize = reports.iter().map(|r| r.positives()).sum();
    info!(files = reports.len(), failed, positives, "finished processing");

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Yaml
    };
    Output::new(format, args.output.clone()).write(&reports)?;
    Ok(())
}
