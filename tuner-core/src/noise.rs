//! # Noise Floor Module
//!
//! Tracks the ambient noise level and derives the RMS gate a frame must
//! exceed to be analysed as a note.
//!
//! Only frames quieter than a fixed "quiet" threshold feed the estimate, so
//! a sustained note can never drag the gate upwards, while the gate still
//! follows changes in room noise between notes.

/// Starting value of the noise estimate before any quiet frame is seen.
pub const INITIAL_NOISE_RMS: f32 = 1e-8;

/// The adaptive gate sits this many times above the noise estimate.
pub const NOISE_GATE_FACTOR: f32 = 3.0;

/// Adaptive noise-RMS tracker.
#[derive(Debug, Clone)]
pub struct NoiseFloorEstimator {
    noise_rms: f32,
    adaptive_threshold: f32,
    quiet_threshold: f32,
    alpha: f32,
    rms_min: f32,
    rms_max: f32,
}

impl NoiseFloorEstimator {
    /// # Arguments
    /// * `quiet_threshold` - frames below this RMS are treated as pure noise
    /// * `alpha` - EMA weight kept from the previous estimate
    /// * `rms_min`, `rms_max` - bounds for the adaptive gate
    pub fn new(quiet_threshold: f32, alpha: f32, rms_min: f32, rms_max: f32) -> Self {
        let mut estimator = Self {
            noise_rms: INITIAL_NOISE_RMS,
            adaptive_threshold: rms_min,
            quiet_threshold,
            alpha,
            rms_min,
            rms_max,
        };
        estimator.recompute_threshold();
        estimator
    }

    /// Feeds one frame's RMS and returns whether it was classified quiet.
    ///
    /// The noise estimate only moves on quiet frames; the gate is recomputed
    /// on every call.
    pub fn observe(&mut self, rms: f32) -> bool {
        let quiet = rms < self.quiet_threshold;
        if quiet {
            self.noise_rms = self.alpha * self.noise_rms + (1.0 - self.alpha) * rms;
        }
        self.recompute_threshold();
        quiet
    }

    /// Whether a frame with this RMS clears the current gate.
    pub fn is_signal(&self, rms: f32) -> bool {
        rms >= self.adaptive_threshold
    }

    pub fn noise_rms(&self) -> f32 {
        self.noise_rms
    }

    pub fn adaptive_threshold(&self) -> f32 {
        self.adaptive_threshold
    }

    /// Forgets the learned noise level, e.g. after a device change.
    pub fn reset(&mut self) {
        self.noise_rms = INITIAL_NOISE_RMS;
        self.recompute_threshold();
    }

    fn recompute_threshold(&mut self) {
        self.adaptive_threshold =
            (NOISE_GATE_FACTOR * self.noise_rms).clamp(self.rms_min, self.rms_max);
    }
}
