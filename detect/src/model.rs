use orcaspot_audio::Spectrogram;

use crate::error::DetectError;

/// Scores a batch of spectrograms.
///
/// Returns one raw score vector (pre-softmax, at least two classes, class 1
/// is the target call) per input spectrogram, in input order.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use. The batch runner calls
/// `classify` from one blocking thread at a time.
pub trait Classifier: Send + Sync {
    fn classify(&self, batch: &[Spectrogram]) -> Result<Vec<Vec<f32>>, DetectError>;
}
