//! [`Classifier`] implementation using ONNX Runtime.

use std::fmt::Display;
use std::path::Path;
use std::sync::Mutex;

use orcaspot_audio::Spectrogram;
use ort::execution_providers::CUDAExecutionProvider;
use ort::inputs;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info};

use crate::config::Device;
use crate::error::DetectError;
use crate::model::Classifier;

fn ort_err(e: impl Display) -> DetectError {
    DetectError::Model(e.to_string())
}

/// Encoder + classifier network exported to ONNX.
///
/// Input is `[batch, 1, time_bins, freq_bins]` f32, output `[batch, classes]`
/// raw scores. Calls are serialized through a mutex around the session.
pub struct OnnxClassifier {
    session: Mutex<Session>,
}

impl OnnxClassifier {
    /// Loads the model at `path`. With [`Device::Accelerator`] the CUDA
    /// execution provider is registered; ONNX Runtime falls back to the CPU
    /// when it is unavailable.
    pub fn open(path: impl AsRef<Path>, device: Device) -> Result<Self, DetectError> {
        let path = path.as_ref();
        let mut builder = Session::builder().map_err(ort_err)?;
        if device == Device::Accelerator {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(ort_err)?;
        }
        let session = builder
            .with_intra_threads(1)
            .map_err(ort_err)?
            .commit_from_file(path)
            .map_err(ort_err)?;

        info!(path = %path.display(), %device, "loaded onnx model");
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, batch: &[Spectrogram]) -> Result<Vec<Vec<f32>>, DetectError> {
        let Some(first) = batch.first() else {
            return Ok(Vec::new());
        };
        let (time_bins, freq_bins) = (first.time_bins(), first.freq_bins());

        let mut data = Vec::with_capacity(batch.len() * time_bins * freq_bins);
        for spec in batch {
            if spec.time_bins() != time_bins || spec.freq_bins() != freq_bins {
                return Err(DetectError::Model(format!(
                    "ragged batch: {}x{} vs {time_bins}x{freq_bins}",
                    spec.time_bins(),
                    spec.freq_bins()
                )));
            }
            data.extend_from_slice(spec.data());
        }

        let input =
            Value::from_array((vec![batch.len(), 1, time_bins, freq_bins], data)).map_err(ort_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectError::Model("session lock poisoned".into()))?;
        let outputs = session.run(inputs![input]).map_err(ort_err)?;
        let (shape, values) = outputs[0].try_extract_tensor::<f32>().map_err(ort_err)?;

        if shape.len() != 2 || shape[0] as usize != batch.len() || shape[1] < 2 {
            return Err(DetectError::Model(format!(
                "unexpected output shape {shape:?} for batch of {}",
                batch.len()
            )));
        }
        let classes = shape[1] as usize;
        debug!(batch = batch.len(), classes, "onnx inference");

        Ok(values.chunks(classes).map(<[f32]>::to_vec).collect())
    }
}
