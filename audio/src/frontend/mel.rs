//! Analysis windows and frequency-compression filterbanks.

use std::f64::consts::PI;

/// Generates a periodic Hann window of the given length.
pub fn hann_window(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Converts frequency in Hz to mel scale.
fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Converts mel scale frequency back to Hz.
fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0)
}

/// A sparse row of weights over consecutive spectrum bins.
#[derive(Debug, Clone)]
struct Filter {
    offset: usize,
    weights: Vec<f64>,
}

/// Linear map from a one-sided spectrum to a compressed frequency axis.
#[derive(Debug, Clone)]
pub struct FilterBank {
    filters: Vec<Filter>,
}

impl FilterBank {
    /// Number of output bins.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Applies the bank to `spectrum`, writing one value per filter into `out`.
    pub fn apply(&self, spectrum: &[f64], out: &mut [f64]) {
        for (o, f) in out.iter_mut().zip(&self.filters) {
            *o = f
                .weights
                .iter()
                .zip(&spectrum[f.offset..])
                .map(|(w, s)| w * s)
                .sum();
        }
    }

    /// Dense copy of one filter row, for inspection.
    #[cfg(test)]
    fn row(&self, m: usize, half_fft: usize) -> Vec<f64> {
        let f = &self.filters[m];
        let mut row = vec![0.0; half_fft];
        row[f.offset..f.offset + f.weights.len()].copy_from_slice(&f.weights);
        row
    }
}

/// Band edges `[low, high)` in spectrum bins for `[f_min, f_max]`.
fn band_bins(fft_size: usize, sample_rate: u32, f_min: f64, f_max: f64) -> (usize, usize) {
    let half_fft = fft_size / 2 + 1;
    let sr = sample_rate as f64;
    let low = ((fft_size as f64 * f_min / sr).floor().max(0.0) as usize).min(half_fft - 1);
    let high = ((fft_size as f64 * f_max / sr).ceil() as usize).clamp(low + 1, half_fft);
    (low, high)
}

/// Linear interpolation of the `[f_min, f_max]` band onto `n_bins` bins.
pub fn linear_filter_bank(
    n_bins: usize,
    fft_size: usize,
    sample_rate: u32,
    f_min: f64,
    f_max: f64,
) -> FilterBank {
    let (low, high) = band_bins(fft_size, sample_rate, f_min, f_max);
    let in_len = high - low;
    let ratio = in_len as f64 / n_bins as f64;

    let filters = (0..n_bins)
        .map(|j| {
            let pos = ((j as f64 + 0.5) * ratio - 0.5).max(0.0);
            let lo = (pos.floor() as usize).min(in_len - 1);
            let hi = (lo + 1).min(in_len - 1);
            let frac = if hi == lo { 0.0 } else { pos - lo as f64 };
            let weights = if hi == lo {
                vec![1.0]
            } else {
                vec![1.0 - frac, frac]
            };
            Filter {
                offset: low + lo,
                weights,
            }
        })
        .collect();
    FilterBank { filters }
}

/// Triangular mel filterbank between `low_freq` and `high_freq`.
pub fn mel_filter_bank(
    num_mels: usize,
    fft_size: usize,
    sample_rate: u32,
    low_freq: f64,
    high_freq: f64,
) -> FilterBank {
    let half_fft = fft_size / 2 + 1;
    let low_mel = hz_to_mel(low_freq);
    let high_mel = hz_to_mel(high_freq);

    // num_mels + 2 equally spaced mel points
    let step = (high_mel - low_mel) / (num_mels + 1) as f64;
    let mut bins: Vec<usize> = (0..num_mels + 2)
        .map(|i| {
            let hz = mel_to_hz(low_mel + i as f64 * step);
            let bin = (hz * fft_size as f64 / sample_rate as f64).round() as usize;
            bin.min(half_fft - 1)
        })
        .collect();

    // Each filter gets at least one bin of width.
    for i in 1..bins.len() {
        if bins[i] <= bins[i - 1] {
            bins[i] = bins[i - 1] + 1;
        }
    }

    let filters = (0..num_mels)
        .map(|m| {
            let (left, center, right) = (bins[m], bins[m + 1], bins[m + 2]);
            let end = right.min(half_fft - 1);
            if left > end {
                // Pushed past Nyquist by the width fix-up above.
                return Filter {
                    offset: end,
                    weights: Vec::new(),
                };
            }
            let weights = (left..=end)
                .map(|k| {
                    if k < center {
                        (k - left) as f64 / (center - left) as f64
                    } else {
                        (right - k) as f64 / (right - center) as f64
                    }
                })
                .collect();
            Filter {
                offset: left,
                weights,
            }
        })
        .collect();
    FilterBank { filters }
}
