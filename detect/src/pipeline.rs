//! Multi-file detection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use orcaspot_audio::{AudioSource, NormalizationMode, SpectralFrontend, WavSource};
use serde::{Deserialize, Serialize};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{DetectOptions, ModelConfig};
use crate::decision::{DecisionAggregator, PredictionRecord};
use crate::error::DetectError;
use crate::model::Classifier;
use crate::runner::BatchRunner;
use crate::source::WindowSource;

/// Outcome of one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub records: Vec<PredictionRecord>,
}

impl FileReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Number of windows decided positive.
    pub fn positives(&self) -> usize {
        self.records.iter().filter(|r| r.decision).count()
    }
}

/// Runs a classifier over whole recordings.
///
/// All configuration is validated in [`Detector::new`]; after that only
/// per-file errors remain.
pub struct Detector {
    model_config: ModelConfig,
    options: DetectOptions,
    frontend: Arc<SpectralFrontend>,
    runner: BatchRunner,
    aggregator: DecisionAggregator,
    sequence_len: usize,
    hop: usize,
}

impl Detector {
    pub fn new(
        model: Arc<dyn Classifier>,
        model_config: ModelConfig,
        options: DetectOptions,
    ) -> Result<Self, DetectError> {
        model_config.validate()?;
        options.validate()?;

        let sr = model_config.sr;
        let sequence_len = options.sequence_samples(sr);
        let hop = options.hop_samples(sr);
        if sequence_len == 0 || hop == 0 {
            return Err(DetectError::InvalidOptions(format!(
                "window of {}s every {}s is empty at {sr} Hz",
                options.sequence_len, options.hop
            )));
        }

        let frontend = SpectralFrontend::new(
            model_config.frontend_config(),
            options.normalization,
            sequence_len,
        )
        .map_err(|e| DetectError::ModelConfigMismatch(e.to_string()))?;

        debug!(?model_config, "model config");
        debug!(?options, sequence_len, hop, "detect options");
        match options.normalization {
            NormalizationMode::MinMax => debug!("init min-max normalization"),
            NormalizationMode::ZeroOneDb => debug!("init 0/1-dB normalization"),
        }

        let runner = BatchRunner::from_options(model, &options)?;
        let aggregator = DecisionAggregator::new(options.threshold, sr);

        Ok(Self {
            model_config,
            options,
            frontend: Arc::new(frontend),
            runner,
            aggregator,
            sequence_len,
            hop,
        })
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn options(&self) -> &DetectOptions {
        &self.options
    }

    /// Window length in samples.
    pub fn sequence_len(&self) -> usize {
        self.sequence_len
    }

    /// Window hop in samples.
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Detects calls in an already opened recording.
    ///
    /// Each record is logged as it is decided.
    pub async fn detect_source(
        &self,
        audio: Arc<dyn AudioSource>,
        origin: &Path,
    ) -> Result<Vec<PredictionRecord>, DetectError> {
        let source = WindowSource::new(audio, self.sequence_len, self.hop, self.frontend.clone())?
            .with_origin(origin);
        info!(
            n_frames = source.indexer().n_frames(),
            hop = self.hop,
            windows = source.len(),
            "segmenting"
        );

        let mut records = Vec::with_capacity(source.len());
        self.runner
            .run_with(Arc::new(source), |score| {
                debug!(start = score.window.start, end = score.window.end, "window");
                let record = self.aggregator.decide(&score)?;
                info!("{record}");
                records.push(record);
                Ok(())
            })
            .await?;
        Ok(records)
    }

    /// Opens a WAV file at the model sample rate and detects calls in it.
    pub async fn detect_file(&self, path: &Path) -> Result<Vec<PredictionRecord>, DetectError> {
        let sr = self.model_config.sr;
        let owned = path.to_path_buf();
        let audio = task::spawn_blocking(move || WavSource::open(&owned, sr))
            .await?
            .map_err(|source| DetectError::InvalidAudio {
                path: path.to_path_buf(),
                source,
            })?;
        if audio.native_sample_rate() != sr {
            debug!(
                from = audio.native_sample_rate(),
                to = sr,
                "resampling per window"
            );
        }
        self.detect_source(Arc::new(audio), path).await
    }

    /// Processes `paths` in order. A failing file is logged and reported,
    /// and the next file is still processed. Cancellation is checked between
    /// files.
    pub async fn detect_files(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Vec<FileReport> {
        info!("predicting {} files", paths.len());

        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            if cancel.is_cancelled() {
                warn!(remaining = paths.len() - reports.len(), "cancelled");
                break;
            }
            info!(path = %path.display(), "processing");

            let report = match self.detect_file(path).await {
                Ok(records) => FileReport {
                    path: path.clone(),
                    error: None,
                    records,
                },
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to process file");
                    FileReport {
                        path: path.clone(),
                        error: Some(e.to_string()),
                        records: Vec::new(),
                    }
                }
            };
            debug!(
                path = %path.display(),
                windows = report.records.len(),
                positives = report.positives(),
                "finished"
            );
            reports.push(report);
        }
        reports
    }
}
