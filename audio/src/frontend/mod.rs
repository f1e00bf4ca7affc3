//! Spectral front-end: raw sample window to normalized spectrogram.
//!
//! Pipeline per window:
//!
//! 1. Right-pad with silence to the fixed window length
//! 2. Pre-emphasis
//! 3. Short-time FFT magnitudes (periodic Hann window, no centering)
//! 4. Frequency compression to `n_freq_bins` (linear or mel)
//! 5. Magnitude to decibels
//! 6. Normalization to `[0, 1]` ([`NormalizationMode`])
//!
//! The output always has the same `(time_bins, freq_bins)` shape for a given
//! front-end, regardless of how many samples the window actually had.

mod fft;
mod mel;
mod normalize;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AudioError;

pub use mel::{FilterBank, hann_window, linear_filter_bank, mel_filter_bank};
pub use normalize::NormalizationMode;
use normalize::{Normalizer, amp_to_db};

/// How the linear spectrum is reduced to `n_freq_bins` bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyCompression {
    /// Linear interpolation of the `[f_min, f_max]` band.
    #[default]
    Linear,
    /// Triangular mel filterbank over `[f_min, f_max]`.
    Mel,
}

impl FromStr for FrequencyCompression {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "mel" => Ok(Self::Mel),
            other => Err(AudioError::InvalidConfig(format!(
                "unsupported frequency compression {other:?}"
            ))),
        }
    }
}

impl fmt::Display for FrequencyCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Mel => write!(f, "mel"),
        }
    }
}

/// Spectral analysis parameters. Must match what the model was trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontendConfig {
    /// Sample rate in Hz (default: 44100).
    pub sample_rate: u32,
    /// FFT length in samples, a power of 2 (default: 4096).
    pub fft_size: usize,
    /// Hop between FFT frames in samples (default: 441 = 10ms @ 44.1kHz).
    pub fft_hop: usize,
    /// Output frequency bins (default: 256).
    pub n_freq_bins: usize,
    /// Lower band edge in Hz (default: 500).
    pub f_min: f64,
    /// Upper band edge in Hz (default: 10000).
    pub f_max: f64,
    /// Frequency compression (default: linear).
    pub compression: FrequencyCompression,
    /// Pre-emphasis coefficient, 0 disables (default: 0.98).
    pub pre_emphasis: f64,
    /// Decibel floor (default: -100).
    pub min_level_db: f64,
    /// Reference level subtracted before 0/1 normalization (default: 20).
    pub ref_level_db: f64,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fft_size: 4096,
            fft_hop: 441,
            n_freq_bins: 256,
            f_min: 500.0,
            f_max: 10000.0,
            compression: FrequencyCompression::Linear,
            pre_emphasis: 0.98,
            min_level_db: -100.0,
            ref_level_db: 20.0,
        }
    }
}

impl FrontendConfig {
    /// Checks the parameters describe a computable front-end.
    pub fn validate(&self) -> Result<(), AudioError> {
        let invalid = |msg: String| Err(AudioError::InvalidConfig(msg));

        if self.sample_rate == 0 {
            return invalid("sample rate must be positive".into());
        }
        if self.fft_size < 2 || !self.fft_size.is_power_of_two() {
            return invalid(format!("fft size {} is not a power of two", self.fft_size));
        }
        if self.fft_hop == 0 {
            return invalid("fft hop must be positive".into());
        }
        if self.n_freq_bins == 0 {
            return invalid("n_freq_bins must be positive".into());
        }
        let nyquist = self.sample_rate as f64 / 2.0;
        if !(self.f_min >= 0.0 && self.f_min < self.f_max && self.f_max <= nyquist) {
            return invalid(format!(
                "frequency band [{}, {}] outside [0, {nyquist}]",
                self.f_min, self.f_max
            ));
        }
        if !(0.0..1.0).contains(&self.pre_emphasis) {
            return invalid(format!("pre-emphasis {} outside [0, 1)", self.pre_emphasis));
        }
        if self.min_level_db.is_nan() || self.min_level_db >= 0.0 {
            return invalid(format!("min_level_db {} must be negative", self.min_level_db));
        }
        Ok(())
    }
}

/// Fixed-shape `(time_bins, freq_bins)` spectrogram, row-major by time.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    time_bins: usize,
    freq_bins: usize,
    data: Vec<f32>,
}

impl Spectrogram {
    /// Wraps row-major data; `data.len()` must equal `time_bins * freq_bins`.
    pub fn new(time_bins: usize, freq_bins: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != time_bins * freq_bins {
            return None;
        }
        Some(Self {
            time_bins,
            freq_bins,
            data,
        })
    }

    pub fn time_bins(&self) -> usize {
        self.time_bins
    }

    pub fn freq_bins(&self) -> usize {
        self.freq_bins
    }

    /// Row-major values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Frequency bins of time frame `t`.
    pub fn frame(&self, t: usize) -> &[f32] {
        &self.data[t * self.freq_bins..(t + 1) * self.freq_bins]
    }
}

/// Converts raw sample windows into normalized spectrograms.
///
/// Built once per run; all tables (window, filterbank, normalizer) are
/// precomputed and [`SpectralFrontend::compute`] takes `&self`, so one
/// front-end can be shared by any number of worker threads.
#[derive(Debug, Clone)]
pub struct SpectralFrontend {
    cfg: FrontendConfig,
    mode: NormalizationMode,
    sequence_len: usize,
    padded_len: usize,
    time_bins: usize,
    window: Vec<f64>,
    bank: FilterBank,
    normalizer: Normalizer,
    min_level: f64,
}

impl SpectralFrontend {
    /// Creates a front-end for windows of `sequence_len` samples.
    pub fn new(
        cfg: FrontendConfig,
        mode: NormalizationMode,
        sequence_len: usize,
    ) -> Result<Self, AudioError> {
        cfg.validate()?;
        if sequence_len == 0 {
            return Err(AudioError::InvalidConfig(
                "sequence length must be positive".into(),
            ));
        }

        let padded_len = sequence_len.max(cfg.fft_size);
        let time_bins = 1 + (padded_len - cfg.fft_size) / cfg.fft_hop;
        let window = hann_window(cfg.fft_size);
        let bank = match cfg.compression {
            FrequencyCompression::Linear => linear_filter_bank(
                cfg.n_freq_bins,
                cfg.fft_size,
                cfg.sample_rate,
                cfg.f_min,
                cfg.f_max,
            ),
            FrequencyCompression::Mel => mel_filter_bank(
                cfg.n_freq_bins,
                cfg.fft_size,
                cfg.sample_rate,
                cfg.f_min,
                cfg.f_max,
            ),
        };
        let normalizer = Normalizer::new(mode, cfg.min_level_db, cfg.ref_level_db);
        let min_level = 10f64.powf(cfg.min_level_db / 20.0);

        Ok(Self {
            cfg,
            mode,
            sequence_len,
            padded_len,
            time_bins,
            window,
            bank,
            normalizer,
            min_level,
        })
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.cfg
    }

    pub fn mode(&self) -> NormalizationMode {
        self.mode
    }

    /// Window length in samples the output shape is fixed to.
    pub fn sequence_len(&self) -> usize {
        self.sequence_len
    }

    pub fn time_bins(&self) -> usize {
        self.time_bins
    }

    pub fn freq_bins(&self) -> usize {
        self.cfg.n_freq_bins
    }

    /// Computes the normalized spectrogram of one window.
    ///
    /// Input shorter than the window is padded with silence; longer input
    /// is truncated.
    pub fn compute(&self, samples: &[f32]) -> Spectrogram {
        let fft_size = self.cfg.fft_size;
        let n_bins = self.cfg.n_freq_bins;

        let mut signal = vec![0.0f64; self.padded_len];
        for (dst, &src) in signal.iter_mut().zip(&samples[..samples.len().min(self.sequence_len)]) {
            *dst = src as f64;
        }

        let a = self.cfg.pre_emphasis;
        if a > 0.0 {
            for i in (1..signal.len()).rev() {
                signal[i] -= a * signal[i - 1];
            }
        }

        let mut frame = vec![0.0f64; fft_size];
        let mut real = vec![0.0f64; fft_size];
        let mut imag = vec![0.0f64; fft_size];
        let mut mags = vec![0.0f64; fft_size / 2 + 1];
        let mut compressed = vec![0.0f64; n_bins];
        let mut data = Vec::with_capacity(self.time_bins * n_bins);

        for t in 0..self.time_bins {
            let start = t * self.cfg.fft_hop;
            for (i, f) in frame.iter_mut().enumerate() {
                *f = signal[start + i] * self.window[i];
            }
            fft::magnitude_spectrum(&frame, &mut real, &mut imag, &mut mags);
            self.bank.apply(&mags, &mut compressed);
            data.extend(compressed.iter().map(|&m| amp_to_db(m, self.min_level)));
        }

        self.normalizer.apply(&mut data);

        Spectrogram {
            time_bins: self.time_bins,
            freq_bins: n_bins,
            data,
        }
    }
}
