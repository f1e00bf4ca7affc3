//! Model metadata and run options.
//!
//! [`ModelConfig`] describes the spectral analysis a model was trained on and
//! is loaded strictly: every key must be present. [`DetectOptions`] holds the
//! run parameters and defaults every field.

use std::fmt;
use std::path::Path;

use orcaspot_audio::{FrequencyCompression, FrontendConfig, NormalizationMode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DetectError;

/// Pre-emphasis coefficient used when the model metadata has none.
pub const DEFAULT_PRE_EMPHASIS: f64 = 0.98;

/// Parses YAML or JSON, picked by file extension.
///
/// Unknown extensions are parsed as YAML, which also accepts JSON.
pub(crate) fn parse_by_extension<T: DeserializeOwned>(
    data: &str,
    path: &Path,
) -> Result<T, String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("json") => serde_json::from_str(data).map_err(|e| e.to_string()),
        _ => serde_yaml::from_str(data).map_err(|e| e.to_string()),
    }
}

/// Spectral parameters the model was trained with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub sr: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_freq_bins: usize,
    pub fmin: f64,
    pub fmax: f64,
    pub freq_compression: FrequencyCompression,
    pub min_level_db: f64,
    pub ref_level_db: f64,
    pub preemphases: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::from_frontend(&FrontendConfig::default())
    }
}

/// Wire form of [`ModelConfig`]; every key optional so missing ones can be
/// named in the error.
#[derive(Debug, Deserialize)]
struct RawModelConfig {
    sr: Option<u32>,
    #[serde(alias = "fft_size")]
    n_fft: Option<usize>,
    #[serde(alias = "fft_hop")]
    hop_length: Option<usize>,
    num_mels: Option<usize>,
    n_freq_bins: Option<usize>,
    fmin: Option<f64>,
    fmax: Option<f64>,
    freq_compression: Option<String>,
    min_level_db: Option<f64>,
    ref_level_db: Option<f64>,
    preemphases: Option<f64>,
}

fn require<T>(value: Option<T>, key: &str) -> Result<T, DetectError> {
    value.ok_or_else(|| DetectError::ModelConfigMismatch(format!("missing key {key:?}")))
}

impl TryFrom<RawModelConfig> for ModelConfig {
    type Error = DetectError;

    fn try_from(raw: RawModelConfig) -> Result<Self, Self::Error> {
        let freq_compression = require(raw.freq_compression, "freq_compression")?
            .parse::<FrequencyCompression>()
            .map_err(|e| DetectError::ModelConfigMismatch(e.to_string()))?;

        let cfg = Self {
            sr: require(raw.sr, "sr")?,
            n_fft: require(raw.n_fft, "n_fft")?,
            hop_length: require(raw.hop_length, "hop_length")?,
            // num_mels wins when both are present
            n_freq_bins: require(raw.num_mels.or(raw.n_freq_bins), "n_freq_bins")?,
            fmin: require(raw.fmin, "fmin")?,
            fmax: require(raw.fmax, "fmax")?,
            freq_compression,
            min_level_db: require(raw.min_level_db, "min_level_db")?,
            ref_level_db: require(raw.ref_level_db, "ref_level_db")?,
            preemphases: raw.preemphases.unwrap_or(DEFAULT_PRE_EMPHASIS),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl ModelConfig {
    fn from_frontend(f: &FrontendConfig) -> Self {
        Self {
            sr: f.sample_rate,
            n_fft: f.fft_size,
            hop_length: f.fft_hop,
            n_freq_bins: f.n_freq_bins,
            fmin: f.f_min,
            fmax: f.f_max,
            freq_compression: f.compression,
            min_level_db: f.min_level_db,
            ref_level_db: f.ref_level_db,
            preemphases: f.pre_emphasis,
        }
    }

    /// Loads a JSON or YAML model metadata file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DetectError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            DetectError::ModelConfigMismatch(format!("read {}: {e}", path.display()))
        })?;
        let raw: RawModelConfig = parse_by_extension(&data, path).map_err(|e| {
            DetectError::ModelConfigMismatch(format!("parse {}: {e}", path.display()))
        })?;
        raw.try_into()
    }

    /// Parses model metadata from a JSON string.
    pub fn from_json_str(data: &str) -> Result<Self, DetectError> {
        let raw: RawModelConfig = serde_json::from_str(data)
            .map_err(|e| DetectError::ModelConfigMismatch(e.to_string()))?;
        raw.try_into()
    }

    /// Front-end parameters derived from the metadata.
    pub fn frontend_config(&self) -> FrontendConfig {
        FrontendConfig {
            sample_rate: self.sr,
            fft_size: self.n_fft,
            fft_hop: self.hop_length,
            n_freq_bins: self.n_freq_bins,
            f_min: self.fmin,
            f_max: self.fmax,
            compression: self.freq_compression,
            pre_emphasis: self.preemphases,
            min_level_db: self.min_level_db,
            ref_level_db: self.ref_level_db,
        }
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        self.frontend_config()
            .validate()
            .map_err(|e| DetectError::ModelConfigMismatch(e.to_string()))
    }
}

/// Inference device preference. Acceleration is best effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Accelerator,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Run parameters for a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectOptions {
    /// Window length in seconds (default: 2).
    pub sequence_len: f64,
    /// Window hop in seconds (default: 1).
    pub hop: f64,
    /// Inclusive probability cutoff for a positive decision (default: 0.5).
    pub threshold: f32,
    /// Windows per inference call (default: 1).
    pub batch_size: usize,
    /// Concurrent window fetches; 0 fetches one at a time (default: 4).
    pub num_workers: usize,
    /// Spectrogram normalization the model was trained with.
    pub normalization: NormalizationMode,
    /// Inference device; falls back to the CPU when no accelerator is usable.
    pub device: Device,
    /// Fetched batches buffered ahead of inference (default: 2).
    pub prefetch_batches: usize,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            sequence_len: 2.0,
            hop: 1.0,
            threshold: 0.5,
            batch_size: 1,
            num_workers: 4,
            normalization: NormalizationMode::ZeroOneDb,
            device: Device::Accelerator,
            prefetch_batches: 2,
        }
    }
}

impl DetectOptions {
    /// Loads options from a JSON or YAML file; absent keys keep defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DetectError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| DetectError::InvalidOptions(format!("read {}: {e}", path.display())))?;
        parse_by_extension(&data, path)
            .map_err(|e| DetectError::InvalidOptions(format!("parse {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        let invalid = |msg: String| Err(DetectError::InvalidOptions(msg));

        if !(self.sequence_len.is_finite() && self.sequence_len > 0.0) {
            return invalid(format!("sequence_len {} must be positive", self.sequence_len));
        }
        if !(self.hop.is_finite() && self.hop > 0.0) {
            return invalid(format!("hop {} must be positive", self.hop));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return invalid(format!("threshold {} outside [0, 1]", self.threshold));
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        if self.prefetch_batches == 0 {
            return invalid("prefetch_batches must be at least 1".into());
        }
        Ok(())
    }

    /// Window length in samples at `sample_rate`.
    pub fn sequence_samples(&self, sample_rate: u32) -> usize {
        seconds_to_samples(self.sequence_len, sample_rate)
    }

    /// Window hop in samples at `sample_rate`.
    pub fn hop_samples(&self, sample_rate: u32) -> usize {
        seconds_to_samples(self.hop, sample_rate)
    }
}

fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    (seconds * sample_rate as f64).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORCA_JSON: &str = r#"{
        "sr": 44100,
        "preemphases": 0.98,
        "n_fft": 4096,
        "hop_length": 441,
        "n_freq_bins": 256,
        "fmin": 500,
        "fmax": 10000,
        "freq_compression": "linear",
        "min_level_db": -100,
        "ref_level_db": 20,
        "augmentation": true
    }"#;

    #[test]
    fn test_model_config_from_json() {
        let cfg = ModelConfig::from_json_str(ORCA_JSON).unwrap();
        assert_eq!(cfg, ModelConfig::default());
    }

    #[test]
    fn test_model_config_num_mels_wins() {
        let json = ORCA_JSON.replace("\"n_freq_bins\": 256", "\"n_freq_bins\": 256, \"num_mels\": 128");
        let cfg = ModelConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg.n_freq_bins, 128);
    }

    #[test]
    fn test_model_config_missing_fmax() {
        let json = ORCA_JSON.replace("\"fmax\": 10000,", "");
        let err = ModelConfig::from_json_str(&json).unwrap_err();
        match err {
            DetectError::ModelConfigMismatch(msg) => assert!(msg.contains("fmax"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_model_config_default_preemphasis() {
        let json = ORCA_JSON.replace("\"preemphases\": 0.98,", "");
        let cfg = ModelConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg.preemphases, DEFAULT_PRE_EMPHASIS);
    }

    #[test]
    fn test_model_config_rejects_mfcc() {
        let json = ORCA_JSON.replace("\"linear\"", "\"mfcc\"");
        assert!(matches!(
            ModelConfig::from_json_str(&json),
            Err(DetectError::ModelConfigMismatch(_))
        ));
    }

    #[test]
    fn test_model_config_rejects_bad_fft() {
        let json = ORCA_JSON.replace("4096", "4000");
        assert!(matches!(
            ModelConfig::from_json_str(&json),
            Err(DetectError::ModelConfigMismatch(_))
        ));
    }

    #[test]
    fn test_model_config_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.yaml");
        std::fs::write(
            &path,
            "sr: 16000\nfft_size: 1024\nfft_hop: 160\nnum_mels: 64\nfmin: 50\nfmax: 8000\n\
             freq_compression: mel\nmin_level_db: -80\nref_level_db: 20\n",
        )
        .unwrap();

        let cfg = ModelConfig::from_file(&path).unwrap();
        assert_eq!(cfg.sr, 16000);
        assert_eq!(cfg.n_fft, 1024);
        assert_eq!(cfg.hop_length, 160);
        assert_eq!(cfg.n_freq_bins, 64);
        assert_eq!(cfg.freq_compression, FrequencyCompression::Mel);
    }

    #[test]
    fn test_options_defaults_and_samples() {
        let opts = DetectOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.sequence_samples(44100), 88200);
        assert_eq!(opts.hop_samples(44100), 44100);

        let opts = DetectOptions {
            sequence_len: 0.5,
            hop: 0.25,
            ..DetectOptions::default()
        };
        assert_eq!(opts.sequence_samples(22050), 11025);
        // 0.25 * 22050 = 5512.5 rounds up
        assert_eq!(opts.hop_samples(22050), 5513);
    }

    #[test]
    fn test_options_validate() {
        let bad = [
            DetectOptions {
                batch_size: 0,
                ..DetectOptions::default()
            },
            DetectOptions {
                hop: 0.0,
                ..DetectOptions::default()
            },
            DetectOptions {
                threshold: 1.5,
                ..DetectOptions::default()
            },
            DetectOptions {
                prefetch_batches: 0,
                ..DetectOptions::default()
            },
        ];
        for opts in bad {
            assert!(matches!(opts.validate(), Err(DetectError::InvalidOptions(_))));
        }
        let zero_workers = DetectOptions {
            num_workers: 0,
            ..DetectOptions::default()
        };
        assert!(zero_workers.validate().is_ok());
    }

    #[test]
    fn test_options_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"threshold": 0.8, "normalization": "min_max", "device": "cpu"}"#)
            .unwrap();

        let opts = DetectOptions::from_file(&path).unwrap();
        assert_eq!(opts.threshold, 0.8);
        assert_eq!(opts.normalization, NormalizationMode::MinMax);
        assert_eq!(opts.device, Device::Cpu);
        assert_eq!(opts.batch_size, 1);
        assert_eq!(opts.sequence_len, 2.0);
    }
}
