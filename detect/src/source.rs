use std::path::{Path, PathBuf};
use std::sync::Arc;

use orcaspot_audio::{AudioSource, SpectralFrontend, Spectrogram};

use crate::error::DetectError;
use crate::window::{Window, WindowIndexer};

/// Indexed access to the spectrograms of a recording's windows.
///
/// Only the samples of the requested window are read, and nothing is
/// cached, so `get` can run concurrently for any set of indices.
pub struct WindowSource {
    audio: Arc<dyn AudioSource>,
    indexer: WindowIndexer,
    frontend: Arc<SpectralFrontend>,
    origin: PathBuf,
}

impl WindowSource {
    /// Creates a source over `audio` with windows of `sequence_len` samples
    /// every `hop` samples.
    ///
    /// `sequence_len` and the audio sample rate must match the front-end.
    pub fn new(
        audio: Arc<dyn AudioSource>,
        sequence_len: usize,
        hop: usize,
        frontend: Arc<SpectralFrontend>,
    ) -> Result<Self, DetectError> {
        if sequence_len != frontend.sequence_len() {
            return Err(DetectError::InvalidOptions(format!(
                "sequence_len {sequence_len} does not match front-end window {}",
                frontend.sequence_len()
            )));
        }
        let model_rate = frontend.config().sample_rate;
        if audio.sample_rate() != model_rate {
            return Err(DetectError::ModelConfigMismatch(format!(
                "audio at {} Hz, model expects {model_rate} Hz",
                audio.sample_rate()
            )));
        }
        let indexer = WindowIndexer::new(audio.n_frames(), sequence_len, hop)?;
        Ok(Self {
            audio,
            indexer,
            frontend,
            origin: PathBuf::from("<memory>"),
        })
    }

    /// Sets the path reported in read errors.
    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Number of windows.
    pub fn len(&self) -> usize {
        self.indexer.num_windows()
    }

    /// Always false; every recording has at least one window.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn indexer(&self) -> &WindowIndexer {
        &self.indexer
    }

    pub fn window(&self, index: usize) -> Option<Window> {
        self.indexer.window(index)
    }

    /// Spectrogram of window `index`.
    pub fn get(&self, index: usize) -> Result<Spectrogram, DetectError> {
        self.fetch(index).map(|(_, spec)| spec)
    }

    /// Window extent and spectrogram of window `index`.
    pub fn fetch(&self, index: usize) -> Result<(Window, Spectrogram), DetectError> {
        let window = self.window(index).ok_or(DetectError::WindowIndex {
            index,
            len: self.len(),
        })?;
        let samples = self
            .audio
            .read(window.start, window.n_samples())
            .map_err(|source| DetectError::InvalidAudio {
                path: self.origin.clone(),
                source,
            })?;
        Ok((window, self.frontend.compute(&samples)))
    }
}
