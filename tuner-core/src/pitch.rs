//! # Pitch Detection Module
//!
//! Fundamental-frequency estimation with the YIN algorithm
//! (de Cheveigné & Kawahara, 2002).
//!
//! The caller hands in one conditioned frame (DC removed, Hann-windowed).
//! The estimator computes the squared difference function over the lag
//! range implied by `fmin`, normalises it cumulatively, takes the first
//! dip below the absolute threshold and refines the lag with parabolic
//! interpolation.
//!
//! The difference function is expanded as
//! `d(τ) = Σx[i]² + Σx[i+τ]² − 2·r(τ)`, with the energy terms taken from a
//! prefix sum and `r(τ)` from an FFT autocorrelation, instead of the
//! O(N·τmax) direct sum.

use crate::fft::LagCorrelator;

/// Added to the running sum of the CMNDF so an all-zero prefix cannot divide by zero.
const CMNDF_EPSILON: f64 = 1e-8;

/// Frames with less total energy than this have no usable periodicity.
const MIN_FRAME_ENERGY: f64 = 1e-12;

/// Fixed parameters of the estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YinParams {
    pub sample_rate: u32,
    /// Lowest detectable frequency; sets the largest lag.
    pub fmin: f32,
    /// Highest detectable frequency; sets the smallest lag.
    pub fmax: f32,
    /// Absolute CMNDF threshold. Smaller is more precise but rejects more.
    pub threshold: f32,
}

impl YinParams {
    /// `floor(fs / fmin)`: exclusive upper bound of the lag search.
    pub fn max_tau(&self) -> usize {
        (self.sample_rate as f64 / self.fmin as f64).floor() as usize
    }

    /// `floor(fs / fmax)`: first lag the threshold search looks at.
    pub fn min_tau(&self) -> usize {
        (self.sample_rate as f64 / self.fmax as f64).floor() as usize
    }
}

/// Raw estimator output for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,
    /// False when no lag dipped below the threshold.
    pub valid: bool,
}

impl PitchEstimate {
    pub fn invalid() -> Self {
        Self {
            frequency_hz: 0.0,
            valid: false,
        }
    }

    /// Valid, finite and positive: safe to smooth and match.
    pub fn is_usable(&self) -> bool {
        self.valid && self.frequency_hz.is_finite() && self.frequency_hz > 0.0
    }
}

/// YIN fundamental-frequency estimator.
///
/// Holds only reusable work buffers and FFT plans; the result depends on
/// the input frame alone.
pub struct YinEstimator {
    params: YinParams,
    max_tau: usize,
    min_tau: usize,
    correlator: Option<LagCorrelator>,
    autocorr: Vec<f64>,
    energy: Vec<f64>,
    diff: Vec<f64>,
    cmndf: Vec<f64>,
}

impl YinEstimator {
    pub fn new(params: YinParams) -> Self {
        let max_tau = params.max_tau();
        Self {
            params,
            max_tau,
            min_tau: params.min_tau().max(1),
            correlator: None,
            autocorr: vec![0.0; max_tau],
            energy: Vec::new(),
            diff: vec![0.0; max_tau],
            cmndf: vec![1.0; max_tau],
        }
    }

    /// Estimates the fundamental frequency of one conditioned frame.
    ///
    /// Returns an invalid estimate for silent frames, frames shorter than
    /// the lag range, and frames with no dip under the threshold.
    pub fn estimate(&mut self, frame: &[f32]) -> PitchEstimate {
        if self.max_tau < 2 || frame.len() <= self.max_tau {
            return PitchEstimate::invalid();
        }

        // Step 1: difference function.
        if !self.difference_function(frame) {
            return PitchEstimate::invalid();
        }

        // Step 2: cumulative mean normalised difference.
        self.cumulative_mean_normalized_difference();

        // Step 3: absolute threshold.
        let Some(tau) = self.absolute_threshold() else {
            return PitchEstimate::invalid();
        };

        // Step 4: parabolic interpolation.
        let refined_tau = self.parabolic_interpolation(tau);

        // Step 5.
        let frequency = self.params.sample_rate as f64 / refined_tau;
        PitchEstimate {
            frequency_hz: frequency as f32,
            valid: true,
        }
    }

    /// Fills `diff[τ]` for `τ` in `1..max_tau`. Returns false for a frame
    /// without energy.
    fn difference_function(&mut self, frame: &[f32]) -> bool {
        let n = frame.len();
        let rebuild = self
            .correlator
            .as_ref()
            .is_none_or(|c| c.frame_len() != n);
        if rebuild {
            self.correlator = Some(LagCorrelator::new(n, self.max_tau));
        }
        let Some(correlator) = self.correlator.as_mut() else {
            return false;
        };
        correlator.autocorrelate(frame, &mut self.autocorr);

        // energy[k] = Σ_{i<k} x[i]²
        self.energy.clear();
        self.energy.reserve(n + 1);
        self.energy.push(0.0);
        let mut acc = 0.0f64;
        for &sample in frame {
            acc += sample as f64 * sample as f64;
            self.energy.push(acc);
        }

        let total = self.energy[n];
        if total <= MIN_FRAME_ENERGY {
            return false;
        }

        self.diff[0] = 0.0;
        for tau in 1..self.max_tau {
            let head = self.energy[n - tau];
            let tail = total - self.energy[tau];
            // Cancellation can leave tiny negative values.
            self.diff[tau] = (head + tail - 2.0 * self.autocorr[tau]).max(0.0);
        }
        true
    }

    fn cumulative_mean_normalized_difference(&mut self) {
        self.cmndf[0] = 1.0;
        let mut running_sum = 0.0;
        for tau in 1..self.max_tau {
            running_sum += self.diff[tau];
            self.cmndf[tau] = self.diff[tau] * tau as f64 / (running_sum + CMNDF_EPSILON);
        }
    }

    /// First lag under the threshold, walked forward to the bottom of its dip.
    fn absolute_threshold(&self) -> Option<usize> {
        let threshold = self.params.threshold as f64;
        let mut tau = self.min_tau;
        while tau < self.max_tau {
            if self.cmndf[tau] < threshold {
                while tau + 1 < self.max_tau && self.cmndf[tau + 1] < self.cmndf[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        None
    }

    fn parabolic_interpolation(&self, tau: usize) -> f64 {
        if tau <= 1 || tau >= self.max_tau - 1 {
            return tau as f64;
        }
        let s0 = self.cmndf[tau - 1];
        let s1 = self.cmndf[tau];
        let s2 = self.cmndf[tau + 1];
        let denom = s0 + s2 - 2.0 * s1;
        if denom != 0.0 {
            tau as f64 + 0.5 * (s0 - s2) / denom
        } else {
            tau as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::{apply_hann_window, remove_dc_offset};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const FS: u32 = 44100;
    const N: usize = 8192;

    fn params() -> YinParams {
        YinParams {
            sample_rate: FS,
            fmin: 60.0,
            fmax: 1000.0,
            threshold: 0.1,
        }
    }

    fn conditioned(mut frame: Vec<f32>) -> Vec<f32> {
        remove_dc_offset(&mut frame);
        apply_hann_window(&mut frame);
        frame
    }

    fn sine(freq: f32, amplitude: f32) -> Vec<f32> {
        (0..N)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / FS as f32).sin())
            .collect()
    }

    #[test]
    fn lag_bounds_follow_frequency_range() {
        let p = params();
        assert_eq!(p.max_tau(), 735);
        assert_eq!(p.min_tau(), 44);
    }

    #[test]
    fn sine_110_within_one_percent() {
        let mut yin = YinEstimator::new(params());
        let estimate = yin.estimate(&conditioned(sine(110.0, 0.5)));
        assert!(estimate.is_usable());
        assert_relative_eq!(estimate.frequency_hz, 110.0, max_relative = 0.01);
    }

    #[test]
    fn guitar_strings_are_resolved() {
        let mut yin = YinEstimator::new(params());
        for &f0 in &[82.41f32, 146.83, 196.0, 246.94, 329.63] {
            let estimate = yin.estimate(&conditioned(sine(f0, 0.3)));
            assert!(estimate.valid, "no pitch for {f0}");
            assert_relative_eq!(estimate.frequency_hz, f0, max_relative = 0.01);
        }
    }

    #[test]
    fn harmonic_rich_tone_reports_fundamental() {
        let frame: Vec<f32> = (0..N)
            .map(|i| {
                let t = i as f32 / FS as f32;
                let w = 2.0 * std::f32::consts::PI * 110.0 * t;
                0.5 * w.sin() + 0.3 * (2.0 * w).sin() + 0.2 * (3.0 * w).sin()
            })
            .collect();
        let mut yin = YinEstimator::new(params());
        let estimate = yin.estimate(&conditioned(frame));
        assert_relative_eq!(estimate.frequency_hz, 110.0, max_relative = 0.01);
    }

    #[test]
    fn silent_frame_is_invalid() {
        let mut yin = YinEstimator::new(params());
        let estimate = yin.estimate(&vec![0.0; N]);
        assert!(!estimate.valid);
        assert_eq!(estimate.frequency_hz, 0.0);
    }

    #[test]
    fn white_noise_is_invalid() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise: Vec<f32> = (0..N).map(|_| rng.gen_range(-0.01..0.01)).collect();
        let mut yin = YinEstimator::new(params());
        let estimate = yin.estimate(&conditioned(noise));
        assert!(!estimate.is_usable());
    }

    #[test]
    fn short_frame_is_invalid() {
        let mut yin = YinEstimator::new(params());
        assert!(!yin.estimate(&[0.5; 512]).valid);
    }

    #[test]
    fn identical_frames_give_identical_estimates() {
        let frame = conditioned(sine(196.0, 0.4));
        let mut yin = YinEstimator::new(params());
        let first = yin.estimate(&frame);
        let second = yin.estimate(&frame);
        assert_eq!(first, second);
        assert_eq!(first, YinEstimator::new(params()).estimate(&frame));
    }

    #[test]
    fn difference_function_matches_direct_definition() {
        let frame = conditioned(sine(220.0, 0.5));
        let mut yin = YinEstimator::new(params());
        assert!(yin.difference_function(&frame));

        for tau in [1usize, 10, 100, 200, 400, 734] {
            let direct: f64 = (0..N - tau)
                .map(|i| {
                    let delta = frame[i] as f64 - frame[i + tau] as f64;
                    delta * delta
                })
                .sum();
            assert_relative_eq!(yin.diff[tau], direct, epsilon = 1e-6, max_relative = 1e-6);
        }
    }

    #[test]
    fn cmndf_dips_at_the_period() {
        let frame = conditioned(sine(441.0, 0.5));
        let mut yin = YinEstimator::new(params());
        assert!(yin.difference_function(&frame));
        yin.cumulative_mean_normalized_difference();

        assert_eq!(yin.cmndf[0], 1.0);
        // 44100 / 441 = 100 samples per period.
        assert!(yin.cmndf[100] < 0.1);
        assert!(yin.cmndf[50] > 1.0);
        assert_eq!(yin.absolute_threshold(), Some(100));
    }

    #[test]
    fn usable_rejects_non_finite() {
        let estimate = PitchEstimate {
            frequency_hz: f32::INFINITY,
            valid: true,
        };
        assert!(!estimate.is_usable());
        assert!(!PitchEstimate::invalid().is_usable());
    }
}
