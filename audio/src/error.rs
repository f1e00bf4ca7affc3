use thiserror::Error;

/// Errors returned by audio reading and front-end construction.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode: {0}")]
    Decode(#[from] hound::Error),

    #[error("audio has zero channels")]
    NoChannels,

    #[error("audio has no samples")]
    Empty,

    #[error("read out of range: start {start}, len {len}, n_frames {n_frames}")]
    OutOfRange {
        start: usize,
        len: usize,
        n_frames: usize,
    },

    #[error("resample: {0}")]
    Resample(String),

    #[error("invalid front-end config: {0}")]
    InvalidConfig(String),
}

impl From<rubato::ResamplerConstructionError> for AudioError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        AudioError::Resample(e.to_string())
    }
}

impl From<rubato::ResampleError> for AudioError {
    fn from(e: rubato::ResampleError) -> Self {
        AudioError::Resample(e.to_string())
    }
}
