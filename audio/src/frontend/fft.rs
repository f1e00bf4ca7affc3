//! In-place radix-2 Cooley-Tukey FFT.

use std::f64::consts::PI;

/// Performs an in-place radix-2 Cooley-Tukey FFT.
/// `real` and `imag` must have the same power-of-2 length.
pub fn fft(real: &mut [f64], imag: &mut [f64]) {
    let n = real.len();
    if n <= 1 {
        return;
    }

    // Bit-reversal permutation
    let mut j = 0usize;
    for i in 0..n - 1 {
        if i < j {
            real.swap(i, j);
            imag.swap(i, j);
        }
        let mut k = n >> 1;
        while k <= j {
            j -= k;
            k >>= 1;
        }
        j += k;
    }

    // Butterflies
    let mut size = 2;
    while size <= n {
        let half = size >> 1;
        let angle = -2.0 * PI / size as f64;
        let (w_r, w_i) = (angle.cos(), angle.sin());

        let mut start = 0;
        while start < n {
            let (mut t_r, mut t_i) = (1.0, 0.0);
            for k in 0..half {
                let u = start + k;
                let v = u + half;

                let tmp_r = t_r * real[v] - t_i * imag[v];
                let tmp_i = t_r * imag[v] + t_i * real[v];

                real[v] = real[u] - tmp_r;
                imag[v] = imag[u] - tmp_i;
                real[u] += tmp_r;
                imag[u] += tmp_i;

                let next_r = t_r * w_r - t_i * w_i;
                t_i = t_r * w_i + t_i * w_r;
                t_r = next_r;
            }
            start += size;
        }
        size <<= 1;
    }
}

/// Magnitudes of the one-sided spectrum of a real frame.
///
/// `frame.len()` must be a power of 2; `out` receives `len / 2 + 1` bins.
/// `real` and `imag` are scratch buffers of the frame length.
pub fn magnitude_spectrum(frame: &[f64], real: &mut [f64], imag: &mut [f64], out: &mut [f64]) {
    real.copy_from_slice(frame);
    imag.fill(0.0);
    fft(real, imag);
    for (k, m) in out.iter_mut().enumerate() {
        *m = (real[k] * real[k] + imag[k] * imag[k]).sqrt();
    }
}
