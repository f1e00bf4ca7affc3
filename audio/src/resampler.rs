//! Rubato-based sample rate conversion for bounded sample ranges.
//!
//! Windows are read independently of each other, so conversion works on one
//! finite range at a time: the range is pushed through an FFT resampler in
//! fixed-size chunks, the tail is zero-padded, and the resampler delay is cut
//! from the front of the output.

use rubato::{FftFixedInOut, Resampler};

use crate::error::AudioError;

/// Frames per processing block handed to rubato.
const CHUNK_SIZE: usize = 1024;

/// Converts mono `input` from `from_rate` to `to_rate` and returns exactly
/// `out_len` samples.
///
/// Output past the converted input is silence.
pub fn resample(
    input: &[f32],
    from_rate: u32,
    to_rate: u32,
    out_len: usize,
) -> Result<Vec<f32>, AudioError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid sample rates: {from_rate} -> {to_rate}"
        )));
    }
    if from_rate == to_rate {
        let mut out = input[..input.len().min(out_len)].to_vec();
        out.resize(out_len, 0.0);
        return Ok(out);
    }

    let mut resampler =
        FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 1)?;
    let delay = resampler.output_delay();
    let want = out_len + delay;

    let mut out = Vec::with_capacity(want + resampler.output_frames_max());
    let mut chunk = Vec::with_capacity(resampler.input_frames_max());
    let mut pos = 0;
    while out.len() < want {
        let need = resampler.input_frames_next();
        chunk.clear();
        if pos < input.len() {
            let end = (pos + need).min(input.len());
            chunk.extend_from_slice(&input[pos..end]);
            pos = end;
        }
        // Pad the last block (and any flush blocks) with silence.
        chunk.resize(need, 0.0);

        let processed = resampler.process(&[chunk.as_slice()], None)?;
        out.extend_from_slice(&processed[0]);
    }

    Ok(out[delay..want].to_vec())
}

/// Number of frames a recording of `frames` frames at `from_rate` has at `to_rate`.
pub fn converted_len(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate || from_rate == 0 {
        return frames;
    }
    (frames as u64 * to_rate as u64 / from_rate as u64) as usize
}
