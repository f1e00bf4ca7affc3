//! Audio access and spectral front-end for call detection.
//!
//! This crate provides:
//!
//! - `source`: random-access mono audio ([`WavSource`], [`MemorySource`])
//! - `resampler`: per-range sample rate conversion backed by rubato
//! - `frontend`: fixed-shape normalized spectrograms ([`SpectralFrontend`])
//!
//! # Example
//!
//! ```rust
//! use orcaspot_audio::{FrontendConfig, MemorySource, AudioSource, NormalizationMode, SpectralFrontend};
//!
//! let cfg = FrontendConfig::default();
//! let frontend = SpectralFrontend::new(cfg, NormalizationMode::ZeroOneDb, 88200).unwrap();
//!
//! let audio = MemorySource::new(vec![0.0; 44100], 44100).unwrap();
//! let window = audio.read(0, 88200).unwrap();
//! let spec = frontend.compute(&window);
//! assert_eq!(spec.time_bins(), frontend.time_bins());
//! assert_eq!(spec.freq_bins(), 256);
//! ```

mod error;
pub mod frontend;
pub mod resampler;
pub mod source;

pub use error::AudioError;
pub use frontend::{
    FrequencyCompression, FrontendConfig, NormalizationMode, SpectralFrontend, Spectrogram,
};
pub use resampler::resample;
pub use source::{AudioSource, MemorySource, WavSource, downmix};
