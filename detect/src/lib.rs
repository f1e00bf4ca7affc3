//! Sliding-window call detection over long recordings.
//!
//! # Architecture
//!
//! ```text
//! WindowIndexer ─▶ WindowSource ─▶ BatchRunner ─▶ DecisionAggregator
//!  (extents)      (read + frontend)  (Classifier)   (softmax, threshold)
//! ```
//!
//! 1. [`WindowIndexer`]: recording length -> fixed-length strided windows
//! 2. [`WindowSource::get`]: window -> normalized [`Spectrogram`]
//! 3. [`BatchRunner::run_with`]: spectrograms -> raw scores, in window order
//! 4. [`DecisionAggregator::decide`]: scores -> [`PredictionRecord`]
//!
//! [`Detector`] wires these together for a list of WAV files.
//!
//! # Model Boundary
//!
//! The network is behind the [`Classifier`] trait. With the `onnx` feature,
//! [`OnnxClassifier`] runs an exported model through ONNX Runtime.
//!
//! [`Spectrogram`]: orcaspot_audio::Spectrogram

mod config;
mod decision;
mod error;
mod model;
#[cfg(feature = "onnx")]
mod model_onnx;
mod pipeline;
mod runner;
mod source;
mod window;

pub use config::{DEFAULT_PRE_EMPHASIS, DetectOptions, Device, ModelConfig};
pub use decision::{DecisionAggregator, PredictionRecord, positive_probability};
pub use error::DetectError;
pub use model::Classifier;
#[cfg(feature = "onnx")]
pub use model_onnx::OnnxClassifier;
pub use pipeline::{Detector, FileReport};
pub use runner::{BatchRunner, WindowScore};
pub use source::WindowSource;
pub use window::{Window, WindowIndexer};

pub use orcaspot_audio::{AudioError, NormalizationMode};
