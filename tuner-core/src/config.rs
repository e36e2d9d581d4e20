//! # Configuration Module
//!
//! The engine's configuration is a plain value handed in by the startup
//! layer. Keys use the `SCREAMING_SNAKE_CASE` names (`FS`, `WIN_SIZE`,
//! `HOP_TIME`, ...) so an existing settings document deserialises as is.
//! Nothing is read from disk here.

use crate::pitch::YinParams;
use crate::tuning::{TargetNoteTable, GUITAR_STANDARD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Default lower bound of the YIN search, in Hz.
pub const DEFAULT_FMIN: f32 = 60.0;

/// Default upper bound of the YIN search, in Hz.
pub const DEFAULT_FMAX: f32 = 1000.0;

/// Errors raised while validating a [`TunerConfig`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Sample rate must be positive")]
    InvalidSampleRate,

    #[error("Frequency range must satisfy 0 < FMIN < FMAX < FS/2, got {fmin}..{fmax} Hz")]
    InvalidFrequencyRange { fmin: f32, fmax: f32 },

    #[error("Window of {window} samples is too short for a maximum lag of {max_lag}")]
    WindowTooShort { window: usize, max_lag: usize },

    #[error("HOP_TIME must be a positive number of seconds, got {0}")]
    InvalidHopTime(f32),

    #[error("{name} must lie in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f32,
    },

    #[error("RMS bounds must satisfy 0 < RMS_MIN <= RMS_MAX, got {min}..{max}")]
    InvalidRmsBounds { min: f32, max: f32 },

    #[error("RMS_ACTIVE_THRESHOLD ({quiet}) must not exceed RMS_MIN ({gate_min})")]
    QuietAboveGate { quiet: f32, gate_min: f32 },

    #[error("Target note table is empty")]
    EmptyNoteTable,

    #[error("Target note {name} has invalid frequency {frequency}")]
    InvalidNoteFrequency { name: String, frequency: f32 },
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TunerConfig {
    /// Sample rate in Hz.
    pub fs: u32,
    /// Sliding window length in samples.
    pub win_size: usize,
    /// Period of the estimation cycle, in seconds.
    pub hop_time: f32,
    /// YIN absolute threshold.
    pub yin_threshold: f32,
    /// Weight of the newest estimate in the smoother.
    pub smooth_alpha: f32,
    /// Frames below this RMS are treated as pure noise.
    pub rms_active_threshold: f32,
    /// Noise EMA weight kept from the previous estimate.
    pub alpha: f32,
    pub rms_min: f32,
    pub rms_max: f32,
    /// Note name to target frequency in Hz.
    pub target_freqs: BTreeMap<String, f32>,
    #[serde(default = "default_fmin")]
    pub fmin: f32,
    #[serde(default = "default_fmax")]
    pub fmax: f32,
}

fn default_fmin() -> f32 {
    DEFAULT_FMIN
}

fn default_fmax() -> f32 {
    DEFAULT_FMAX
}

impl TunerConfig {
    /// Preset for a six-string guitar in standard tuning at 44.1 kHz.
    pub fn guitar_standard() -> Self {
        Self {
            fs: 44100,
            win_size: 8192,
            hop_time: 0.04,
            yin_threshold: 0.1,
            smooth_alpha: 0.6,
            rms_active_threshold: 1e-3,
            alpha: 0.95,
            rms_min: 1e-3,
            rms_max: 0.05,
            target_freqs: GUITAR_STANDARD
                .iter()
                .map(|&(name, freq)| (name.to_string(), freq))
                .collect(),
            fmin: DEFAULT_FMIN,
            fmax: DEFAULT_FMAX,
        }
    }

    /// Checks every option and builds the note table.
    pub fn validate(&self) -> Result<TargetNoteTable, ConfigError> {
        if self.fs == 0 {
            return Err(ConfigError::InvalidSampleRate);
        }

        let nyquist = self.fs as f32 / 2.0;
        let range_ok = self.fmin.is_finite()
            && self.fmax.is_finite()
            && self.fmin > 0.0
            && self.fmin < self.fmax
            && self.fmax < nyquist;
        if !range_ok {
            return Err(ConfigError::InvalidFrequencyRange {
                fmin: self.fmin,
                fmax: self.fmax,
            });
        }

        let max_lag = self.yin_params().max_tau();
        if self.win_size <= max_lag {
            return Err(ConfigError::WindowTooShort {
                window: self.win_size,
                max_lag,
            });
        }

        self.hop_duration()?;

        check_range("YIN_THRESHOLD", "(0, 1)", self.yin_threshold, |v| v > 0.0 && v < 1.0)?;
        check_range("SMOOTH_ALPHA", "(0, 1]", self.smooth_alpha, |v| v > 0.0 && v <= 1.0)?;
        check_range("ALPHA", "[0, 1)", self.alpha, |v| (0.0..1.0).contains(&v))?;

        let bounds_ok = self.rms_min.is_finite()
            && self.rms_max.is_finite()
            && self.rms_min > 0.0
            && self.rms_min <= self.rms_max;
        if !bounds_ok {
            return Err(ConfigError::InvalidRmsBounds {
                min: self.rms_min,
                max: self.rms_max,
            });
        }

        check_range("RMS_ACTIVE_THRESHOLD", "(0, RMS_MIN]", self.rms_active_threshold, |v| {
            v > 0.0
        })?;
        if self.rms_active_threshold > self.rms_min {
            return Err(ConfigError::QuietAboveGate {
                quiet: self.rms_active_threshold,
                gate_min: self.rms_min,
            });
        }

        TargetNoteTable::from_map(&self.target_freqs)
    }

    /// `HOP_TIME` as a `Duration`. Rejects values that do not fit a
    /// `Duration` or round down to zero.
    pub fn hop_duration(&self) -> Result<Duration, ConfigError> {
        match Duration::try_from_secs_f32(self.hop_time) {
            Ok(hop) if !hop.is_zero() => Ok(hop),
            _ => Err(ConfigError::InvalidHopTime(self.hop_time)),
        }
    }

    pub fn yin_params(&self) -> YinParams {
        YinParams {
            sample_rate: self.fs,
            fmin: self.fmin,
            fmax: self.fmax,
            threshold: self.yin_threshold,
        }
    }
}

fn check_range(
    name: &'static str,
    range: &'static str,
    value: f32,
    ok: impl Fn(f32) -> bool,
) -> Result<(), ConfigError> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, range, value })
    }
}
