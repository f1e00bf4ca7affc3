//! Bounded producer/consumer pipeline from window fetches to model scores.
//!
//! ```text
//! producer task                               consumer (caller)
//! ┌─────────────────────────────────────┐     ┌───────────────────────┐
//! │ 0..len ─▶ spawn_blocking(fetch)     │     │ recv batch            │
//! │        ─▶ buffered(workers)         │ ──▶ │ spawn_blocking(model) │
//! │        ─▶ chunks(batch_size)        │ mpsc│ emit in index order   │
//! └─────────────────────────────────────┘ (prefetch_batches)          │
//!                                             └───────────────────────┘
//! ```
//!
//! `buffered` yields fetches in submission order whatever their completion
//! order, so output order never depends on `num_workers`.

use std::sync::Arc;

use futures::{StreamExt, stream};
use orcaspot_audio::Spectrogram;
use tokio::sync::mpsc;
use tokio::task;
use tracing::debug;

use crate::config::DetectOptions;
use crate::error::DetectError;
use crate::model::Classifier;
use crate::source::WindowSource;
use crate::window::Window;

/// Raw model scores for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowScore {
    pub window: Window,
    pub scores: Vec<f32>,
}

/// Contiguous windows and their spectrograms, in index order.
struct Batch {
    windows: Vec<Window>,
    frames: Vec<Spectrogram>,
}

impl FromIterator<(Window, Spectrogram)> for Batch {
    fn from_iter<I: IntoIterator<Item = (Window, Spectrogram)>>(iter: I) -> Self {
        let (windows, frames) = iter.into_iter().unzip();
        Self { windows, frames }
    }
}

/// Runs a [`Classifier`] over every window of a [`WindowSource`].
pub struct BatchRunner {
    model: Arc<dyn Classifier>,
    batch_size: usize,
    num_workers: usize,
    prefetch_batches: usize,
}

impl BatchRunner {
    /// `num_workers == 0` means one fetch at a time.
    pub fn new(
        model: Arc<dyn Classifier>,
        batch_size: usize,
        num_workers: usize,
        prefetch_batches: usize,
    ) -> Result<Self, DetectError> {
        if batch_size == 0 || prefetch_batches == 0 {
            return Err(DetectError::InvalidOptions(format!(
                "batch_size {batch_size} and prefetch_batches {prefetch_batches} must be at least 1"
            )));
        }
        Ok(Self {
            model,
            batch_size,
            num_workers,
            prefetch_batches,
        })
    }

    pub fn from_options(
        model: Arc<dyn Classifier>,
        options: &DetectOptions,
    ) -> Result<Self, DetectError> {
        Self::new(
            model,
            options.batch_size,
            options.num_workers,
            options.prefetch_batches,
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Scores every window and collects the results in index order.
    pub async fn run(&self, source: Arc<WindowSource>) -> Result<Vec<WindowScore>, DetectError> {
        let mut scores = Vec::with_capacity(source.len());
        self.run_with(source, |score| {
            scores.push(score);
            Ok(())
        })
        .await?;
        Ok(scores)
    }

    /// Scores every window, handing each result to `emit` in index order.
    ///
    /// Stops at the first failed batch or the first error from `emit`; no
    /// score from a failed batch is emitted. Returns the number of windows
    /// emitted.
    pub async fn run_with<F>(&self, source: Arc<WindowSource>, mut emit: F) -> Result<usize, DetectError>
    where
        F: FnMut(WindowScore) -> Result<(), DetectError>,
    {
        let (tx, mut rx) = mpsc::channel(self.prefetch_batches);
        let producer = tokio::spawn(produce(
            source,
            self.batch_size,
            self.num_workers.max(1),
            tx,
        ));

        let consumed = self.consume(&mut rx, &mut emit).await;
        drop(rx);

        match consumed {
            Ok(n) => {
                producer.await?;
                Ok(n)
            }
            Err(e) => {
                producer.abort();
                Err(e)
            }
        }
    }

    async fn consume<F>(
        &self,
        rx: &mut mpsc::Receiver<Result<Batch, DetectError>>,
        emit: &mut F,
    ) -> Result<usize, DetectError>
    where
        F: FnMut(WindowScore) -> Result<(), DetectError>,
    {
        let mut emitted = 0;
        while let Some(batch) = rx.recv().await {
            let Batch { windows, frames } = batch?;
            let model = self.model.clone();
            let scores = task::spawn_blocking(move || model.classify(&frames)).await??;

            if scores.len() != windows.len() {
                return Err(DetectError::Model(format!(
                    "model returned {} score vectors for {} windows",
                    scores.len(),
                    windows.len()
                )));
            }
            debug!(
                first = windows.first().map(|w| w.index),
                size = windows.len(),
                "scored batch"
            );

            for (window, scores) in windows.into_iter().zip(scores) {
                emit(WindowScore { window, scores })?;
                emitted += 1;
            }
        }
        Ok(emitted)
    }
}

/// Fetches windows with bounded concurrency and sends them as batches.
///
/// A failed fetch is sent in place of its batch and ends production.
async fn produce(
    source: Arc<WindowSource>,
    batch_size: usize,
    workers: usize,
    tx: mpsc::Sender<Result<Batch, DetectError>>,
) {
    let mut batches = stream::iter(0..source.len())
        .map(|index| {
            let source = source.clone();
            async move {
                task::spawn_blocking(move || source.fetch(index))
                    .await
                    .map_err(DetectError::from)
                    .and_then(|fetched| fetched)
            }
        })
        .buffered(workers)
        .chunks(batch_size);

    while let Some(fetched) = batches.next().await {
        let batch = fetched.into_iter().collect::<Result<Batch, DetectError>>();
        let failed = batch.is_err();
        if tx.send(batch).await.is_err() || failed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use orcaspot_audio::{AudioError, AudioSource, FrontendConfig, NormalizationMode, SpectralFrontend};

    const RATE: u32 = 8000;
    const SEQ: usize = 800;
    const HOP: usize = 400;

    /// Ramp audio whose reads take longer for earlier windows, so fetches
    /// complete out of order when run concurrently.
    struct SlowSource {
        n_frames: usize,
        fail_at: Option<usize>,
    }

    impl AudioSource for SlowSource {
        fn n_frames(&self) -> usize {
            self.n_frames
        }

        fn sample_rate(&self) -> u32 {
            RATE
        }

        fn read(&self, start: usize, len: usize) -> Result<Vec<f32>, AudioError> {
            if self.fail_at == Some(start) {
                return Err(AudioError::Io(std::io::Error::other("bad sector")));
            }
            let remaining = self.n_frames.saturating_sub(start);
            std::thread::sleep(Duration::from_millis((remaining / HOP) as u64));
            let end = (start + len).min(self.n_frames);
            Ok((start..end).map(|i| ((i % 97) as f32 / 97.0) - 0.5).collect())
        }
    }

    /// Scores each window by the mean of its spectrogram and records batch sizes.
    #[derive(Default)]
    struct MeanClassifier {
        batches: Mutex<Vec<usize>>,
        calls: AtomicUsize,
    }

    impl Classifier for MeanClassifier {
        fn classify(&self, batch: &[Spectrogram]) -> Result<Vec<Vec<f32>>, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(batch.len());
            Ok(batch
                .iter()
                .map(|s| {
                    let mean = s.data().iter().sum::<f32>() / s.data().len() as f32;
                    vec![0.0, mean]
                })
                .collect())
        }
    }

    struct ShortClassifier;

    impl Classifier for ShortClassifier {
        fn classify(&self, batch: &[Spectrogram]) -> Result<Vec<Vec<f32>>, DetectError> {
            Ok(vec![vec![0.0, 1.0]; batch.len().saturating_sub(1)])
        }
    }

    fn source(n_frames: usize, fail_at: Option<usize>) -> Arc<WindowSource> {
        let cfg = FrontendConfig {
            sample_rate: RATE,
            fft_size: 256,
            fft_hop: 128,
            n_freq_bins: 16,
            f_min: 100.0,
            f_max: 3800.0,
            ..FrontendConfig::default()
        };
        let fe = Arc::new(SpectralFrontend::new(cfg, NormalizationMode::MinMax, SEQ).unwrap());
        let audio = Arc::new(SlowSource { n_frames, fail_at });
        Arc::new(WindowSource::new(audio, SEQ, HOP, fe).unwrap())
    }

    #[tokio::test]
    async fn test_order_invariant_under_concurrency() {
        let src = source(HOP * 12 + 123, None);

        let serial = BatchRunner::new(Arc::new(MeanClassifier::default()), 3, 1, 2)
            .unwrap()
            .run(src.clone())
            .await
            .unwrap();
        let parallel = BatchRunner::new(Arc::new(MeanClassifier::default()), 3, 4, 2)
            .unwrap()
            .run(src)
            .await
            .unwrap();

        assert_eq!(serial.len(), 12);
        assert_eq!(serial, parallel);
        for (i, s) in parallel.iter().enumerate() {
            assert_eq!(s.window.index, i);
        }
    }

    #[tokio::test]
    async fn test_batches_are_contiguous() {
        let model = Arc::new(MeanClassifier::default());
        let runner = BatchRunner::new(model.clone(), 4, 0, 1).unwrap();
        let scores = runner.run(source(HOP * 10, None)).await.unwrap();

        assert_eq!(scores.len(), 10);
        assert_eq!(*model.batches.lock().unwrap(), vec![4, 4, 2]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_whole_batch() {
        // Window 5 starts at 5 * HOP; batch [4, 5] must not be emitted.
        let runner = BatchRunner::new(Arc::new(MeanClassifier::default()), 2, 3, 2).unwrap();
        let mut seen = Vec::new();
        let err = runner
            .run_with(source(HOP * 10, Some(5 * HOP)), |s| {
                seen.push(s.window.index);
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DetectError::InvalidAudio { .. }));
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_score_count_mismatch() {
        let runner = BatchRunner::new(Arc::new(ShortClassifier), 2, 1, 1).unwrap();
        let err = runner.run(source(HOP * 4, None)).await.unwrap_err();
        assert!(matches!(err, DetectError::Model(_)));
    }

    #[tokio::test]
    async fn test_emit_error_stops_run() {
        let runner = BatchRunner::new(Arc::new(MeanClassifier::default()), 1, 2, 1).unwrap();
        let mut count = 0;
        let err = runner
            .run_with(source(HOP * 8, None), |_| {
                count += 1;
                if count == 3 {
                    return Err(DetectError::Model("stop".into()));
                }
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::Model(_)));
        assert_eq!(count, 3);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(BatchRunner::new(Arc::new(ShortClassifier), 0, 1, 1).is_err());
        assert!(BatchRunner::new(Arc::new(ShortClassifier), 1, 1, 0).is_err());
    }
}
