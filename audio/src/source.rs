//! Random-access mono audio sources.
//!
//! An [`AudioSource`] is an immutable handle to one recording, already
//! reduced to a single channel and presented at the sample rate the model
//! expects. Reads are by frame range so that a long recording never has to
//! be held in memory as a whole.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec};
use tracing::debug;

use crate::error::AudioError;
use crate::resampler::{converted_len, resample};

/// Extra source frames read past a range before resampling, so the
/// converter sees real signal instead of padding at the range end.
const RESAMPLE_MARGIN: usize = 64;

/// Read-only access to a mono recording at a fixed sample rate.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent reads of different ranges.
pub trait AudioSource: Send + Sync {
    /// Total number of frames.
    fn n_frames(&self) -> usize;

    /// Sample rate of the frames returned by [`AudioSource::read`].
    fn sample_rate(&self) -> u32;

    /// Reads up to `len` frames starting at `start`.
    ///
    /// The result is shorter than `len` when the range runs past the end.
    /// Fails with [`AudioError::OutOfRange`] when `start >= n_frames`.
    fn read(&self, start: usize, len: usize) -> Result<Vec<f32>, AudioError>;
}

/// Audio held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl MemorySource {
    /// Wraps mono samples; fails on empty input.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        if samples.is_empty() {
            return Err(AudioError::Empty);
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }
}

impl AudioSource for MemorySource {
    fn n_frames(&self) -> usize {
        self.samples.len()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&self, start: usize, len: usize) -> Result<Vec<f32>, AudioError> {
        let end = check_range(start, len, self.samples.len())?;
        Ok(self.samples[start..end].to_vec())
    }
}

/// WAV file read on demand.
///
/// Each read opens its own reader and seeks to the requested range, so
/// concurrent reads share nothing but the path and the header.
/// Multi-channel audio is averaged to mono. When the file's sample rate
/// differs from the requested one, each range is resampled on its own.
#[derive(Debug, Clone)]
pub struct WavSource {
    path: PathBuf,
    spec: WavSpec,
    src_frames: usize,
    sample_rate: u32,
    n_frames: usize,
}

impl WavSource {
    /// Opens `path` and validates its header; samples are not read yet.
    pub fn open(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, AudioError> {
        let path = path.as_ref().to_path_buf();
        let reader = WavReader::open(&path)?;
        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(AudioError::NoChannels);
        }

        let src_frames = reader.duration() as usize;
        let n_frames = converted_len(src_frames, spec.sample_rate, sample_rate);
        if n_frames == 0 {
            return Err(AudioError::Empty);
        }

        debug!(
            path = %path.display(),
            channels = spec.channels,
            bits = spec.bits_per_sample,
            src_rate = spec.sample_rate,
            src_frames,
            sample_rate,
            n_frames,
            "opened wav source"
        );

        Ok(Self {
            path,
            spec,
            src_frames,
            sample_rate,
            n_frames,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Channel count of the file (before reduction to mono).
    pub fn channels(&self) -> u16 {
        self.spec.channels
    }

    /// Sample rate stored in the file.
    pub fn native_sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Reads `len` native-rate frames from `start`, reduced to mono.
    fn read_native(&self, start: usize, len: usize) -> Result<Vec<f32>, AudioError> {
        let len = len.min(self.src_frames.saturating_sub(start));
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut reader: WavReader<BufReader<File>> = WavReader::open(&self.path)?;
        reader.seek(start as u32)?;

        let channels = self.spec.channels as usize;
        let total = len * channels;
        let interleaved: Vec<f32> = match self.spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .take(total)
                .collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (self.spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .take(total)
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };

        Ok(downmix(&interleaved, channels))
    }
}

impl AudioSource for WavSource {
    fn n_frames(&self) -> usize {
        self.n_frames
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&self, start: usize, len: usize) -> Result<Vec<f32>, AudioError> {
        let end = check_range(start, len, self.n_frames)?;
        let len = end - start;

        let native = self.spec.sample_rate;
        if native == self.sample_rate {
            return self.read_native(start, len);
        }

        // Map the range onto the file's own timeline.
        let src_start = (start as u64 * native as u64 / self.sample_rate as u64) as usize;
        let src_len = (len as u64 * native as u64).div_ceil(self.sample_rate as u64) as usize;
        let raw = self.read_native(src_start, src_len + RESAMPLE_MARGIN)?;
        resample(&raw, native, self.sample_rate, len)
    }
}

/// Validates a read range and returns its clamped end.
fn check_range(start: usize, len: usize, n_frames: usize) -> Result<usize, AudioError> {
    if start >= n_frames {
        return Err(AudioError::OutOfRange {
            start,
            len,
            n_frames,
        });
    }
    Ok(start.saturating_add(len).min(n_frames))
}

/// Averages interleaved frames to mono. A trailing partial frame is dropped.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}
