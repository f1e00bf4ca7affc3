use std::path::PathBuf;

use orcaspot_audio::AudioError;
use thiserror::Error;

/// Errors returned by window extraction, inference and orchestration.
#[derive(Debug, Error)]
pub enum DetectError {
    /// The recording cannot be opened, decoded or read. Fails one file only.
    #[error("invalid audio {}: {source}", path.display())]
    InvalidAudio { path: PathBuf, source: AudioError },

    /// Model metadata is missing a key or holds an unusable value.
    #[error("model config mismatch: {0}")]
    ModelConfigMismatch(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("window index {index} out of range (len {len})")]
    WindowIndex { index: usize, len: usize },

    #[error("model error: {0}")]
    Model(String),

    #[error("task join: {0}")]
    Join(#[from] tokio::task::JoinError),
}
