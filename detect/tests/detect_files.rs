use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hound::{SampleFormat, WavSpec, WavWriter};
use orcaspot_audio::{FrequencyCompression, Spectrogram};
use orcaspot_detect::{
    Classifier, DetectError, DetectOptions, Detector, FileReport, ModelConfig, NormalizationMode,
};
use tokio_util::sync::CancellationToken;

const SR: u32 = 16000;

/// Positive when the spectrogram has more energy than `level` on average.
struct EnergyClassifier {
    level: f32,
}

impl Classifier for EnergyClassifier {
    fn classify(&self, batch: &[Spectrogram]) -> Result<Vec<Vec<f32>>, DetectError> {
        Ok(batch
            .iter()
            .map(|s| {
                let mean = s.data().iter().sum::<f32>() / s.data().len() as f32;
                vec![self.level, mean]
            })
            .collect())
    }
}

fn model_config() -> ModelConfig {
    ModelConfig {
        sr: SR,
        n_fft: 512,
        hop_length: 160,
        n_freq_bins: 64,
        fmin: 300.0,
        fmax: 7000.0,
        freq_compression: FrequencyCompression::Linear,
        min_level_db: -100.0,
        ref_level_db: 20.0,
        preemphases: 0.98,
    }
}

/// Writes `seconds` of audio: silence, with a 2 kHz tone in `[tone_from, tone_to)` seconds.
fn write_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f32, tone: (f32, f32)) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    let n = (seconds * sample_rate as f32) as usize;
    for i in 0..n {
        let t = i as f32 / sample_rate as f32;
        let v = if t >= tone.0 && t < tone.1 {
            (2.0 * PI * 2000.0 * t).sin() * 0.5
        } else {
            0.0
        };
        for _ in 0..channels {
            writer.write_sample((v * 32767.0) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
}

fn detector(options: DetectOptions) -> Detector {
    Detector::new(Arc::new(EnergyClassifier { level: 0.005 }), model_config(), options).unwrap()
}

#[tokio::test]
async fn test_detects_tone_windows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_wav(&path, SR, 1, 6.0, (2.0, 4.0));

    let d = detector(DetectOptions::default());
    let records = d.detect_file(&path).await.unwrap();

    assert_eq!(records.len(), 6);
    let decisions: Vec<bool> = records.iter().map(|r| r.decision).collect();
    // Windows are [i, i + 2) seconds; every window touching [2, 4) hears the tone.
    assert_eq!(decisions, vec![false, true, true, true, false, false]);
    assert_eq!(records[5].t_start, 5.0);
    assert!((records[5].t_end - (6.0 * SR as f64 - 1.0) / SR as f64).abs() < 1e-12);
}

#[tokio::test]
async fn test_missing_file_does_not_stop_run() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.wav");
    let missing = dir.path().join("missing.wav");
    let also_good = dir.path().join("also_good.wav");
    write_wav(&good, SR, 1, 3.0, (0.0, 0.0));
    write_wav(&also_good, SR, 1, 2.5, (0.0, 2.5));

    let d = detector(DetectOptions::default());
    let paths = vec![good.clone(), missing.clone(), also_good.clone()];
    let reports = d.detect_files(&paths, &CancellationToken::new()).await;

    assert_eq!(reports.len(), 3);
    assert!(reports[0].is_ok());
    assert_eq!(reports[0].records.len(), 3);
    assert!(!reports[1].is_ok());
    assert!(reports[1].records.is_empty());
    assert!(reports[2].is_ok());
    assert_eq!(reports[2].records.len(), 2);
    assert_eq!(reports[2].positives(), 2);
}

#[tokio::test]
async fn test_resampled_stereo_matches_windows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo48k.wav");
    write_wav(&path, 48000, 2, 4.0, (0.0, 1.0));

    let d = detector(DetectOptions {
        batch_size: 3,
        num_workers: 2,
        ..DetectOptions::default()
    });
    let records = d.detect_file(&path).await.unwrap();

    // 4 s at 16 kHz with a 1 s hop.
    assert_eq!(records.len(), 4);
    assert!(records[0].decision);
    assert!(!records[3].decision);
}

#[tokio::test]
async fn test_workers_do_not_change_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.wav");
    write_wav(&path, SR, 1, 12.0, (3.0, 7.5));

    let serial = detector(DetectOptions {
        num_workers: 0,
        batch_size: 1,
        hop: 0.5,
        ..DetectOptions::default()
    });
    let parallel = detector(DetectOptions {
        num_workers: 6,
        batch_size: 5,
        hop: 0.5,
        ..DetectOptions::default()
    });

    let a = serial.detect_file(&path).await.unwrap();
    let b = parallel.detect_file(&path).await.unwrap();
    assert_eq!(a.len(), 24);
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_min_max_mode_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("silence.wav");
    write_wav(&path, SR, 1, 3.0, (0.0, 0.0));

    let d = detector(DetectOptions {
        normalization: NormalizationMode::MinMax,
        ..DetectOptions::default()
    });
    let records = d.detect_file(&path).await.unwrap();
    assert_eq!(records.len(), 3);
    // Silent windows normalize to zeros, below the classifier level.
    assert!(records.iter().all(|r| !r.decision && r.probability.is_finite()));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.wav");
    write_wav(&path, SR, 1, 2.0, (0.0, 0.0));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let reports = detector(DetectOptions::default())
        .detect_files(&[path], &cancel)
        .await;
    assert!(reports.is_empty());
}

#[test]
fn test_report_serializes() {
    let report = FileReport {
        path: PathBuf::from("x.wav"),
        error: None,
        records: Vec::new(),
    };
    let json = serde_json::to_string(&report).unwrap();
    assert_eq!(json, r#"{"path":"x.wav","records":[]}"#);
}
