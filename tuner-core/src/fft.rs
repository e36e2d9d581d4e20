//! # Frame Conditioning and FFT Module
//!
//! Helpers that prepare a snapshot for pitch estimation, plus the
//! FFT-backed lag autocorrelation that YIN's difference function is built on.
//!
//! ## Features
//! - DC offset removal, RMS and peak measurement
//! - Hann windowing
//! - Linear (non-circular) autocorrelation over a bounded lag range

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = (signal.iter().map(|&s| s as f64).sum::<f64>() / len as f64) as f32;
    for sample in signal.iter_mut() {
        *sample -= avg;
    }
}

/// Root-mean-square amplitude of a frame. Zero for an empty frame.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    let power = signal.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / signal.len() as f64;
    power.sqrt() as f32
}

/// Largest absolute sample value.
pub fn peak_amplitude(signal: &[f32]) -> f32 {
    signal.iter().fold(0.0f32, |peak, &s| peak.max(s.abs()))
}

/// Applies a symmetric Hann window in place.
///
/// The window reaches zero at both edges, matching the usual
/// `0.5 * (1 - cos(2πi / (n - 1)))` definition.
pub fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Computes `r(τ) = Σ x[i]·x[i+τ]` for `τ` in `0..max_lag` with one forward
/// and one inverse FFT.
///
/// The signal is zero-padded to at least `frame_len + max_lag` so the
/// circular correlation equals the linear one over the requested lags.
/// Plans and work buffers are allocated once per frame length.
pub struct LagCorrelator {
    frame_len: usize,
    max_lag: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl LagCorrelator {
    pub fn new(frame_len: usize, max_lag: usize) -> Self {
        let size = (frame_len + max_lag).max(1).next_power_of_two();
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            frame_len,
            max_lag,
            forward,
            inverse,
            spectrum: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Writes the autocorrelation of `signal` for lags `0..result.len()`.
    ///
    /// `signal` must be `frame_len` long and `result` at most `max_lag` long.
    pub fn autocorrelate(&mut self, signal: &[f32], result: &mut [f64]) {
        debug_assert_eq!(signal.len(), self.frame_len);
        debug_assert!(result.len() <= self.max_lag);

        for (slot, &sample) in self.spectrum.iter_mut().zip(signal) {
            *slot = Complex::new(sample as f64, 0.0);
        }
        for slot in self.spectrum.iter_mut().skip(signal.len()) {
            *slot = Complex::new(0.0, 0.0);
        }

        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);
        for bin in self.spectrum.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        // rustfft does not normalise the inverse transform.
        let scale = 1.0 / self.spectrum.len() as f64;
        for (r, bin) in result.iter_mut().zip(&self.spectrum) {
            *r = bin.re * scale;
        }
    }
}
