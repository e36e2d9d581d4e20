// tuner-core/src/lib.rs

//! The core logic for the real-time instrument tuner.
//! This crate is responsible for buffering audio, gating noise, pitch
//! detection and note matching. It is completely headless: it consumes
//! sample chunks and produces tuning events, and contains no audio-device
//! or rendering code.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod fft;
pub mod noise;
pub mod pitch;
pub mod smoothing;
pub mod tuning;

pub use config::{ConfigError, TunerConfig};
pub use engine::{
    ChannelSink, EngineHandle, EventSink, PitchTracker, SampleProducer, TunerEngine, TunerState,
};

use thiserror::Error;

/// Snapshots whose peak amplitude stays below this are treated as silence.
pub const AMP_EPSILON: f32 = 1e-8;

/// A detected pitch, matched against the target note table.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchEvent {
    /// Name of the nearest target note.
    pub note: String,
    /// Smoothed fundamental frequency in Hz.
    pub frequency_hz: f32,
    /// Frequency of the matched target note in Hz.
    pub target_hz: f32,
    /// `frequency_hz - target_hz`.
    pub offset_hz: f32,
    /// Deviation from the target in cents.
    pub cents: f32,
}

/// Why a cycle produced no pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSignalReason {
    /// Peak amplitude below [`AMP_EPSILON`].
    Silence,
    /// RMS below the adaptive noise gate.
    BelowGate,
    /// No periodicity found, or a non-finite estimate.
    Aperiodic,
    /// The cycle panicked; the loop carries on with the next one.
    AnalysisFailed,
}

/// Output of one estimation cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TunerEvent {
    Pitch(PitchEvent),
    NoSignal { reason: NoSignalReason },
}

impl TunerEvent {
    pub fn pitch(&self) -> Option<&PitchEvent> {
        match self {
            TunerEvent::Pitch(event) => Some(event),
            TunerEvent::NoSignal { .. } => None,
        }
    }

    pub fn is_no_signal(&self) -> bool {
        matches!(self, TunerEvent::NoSignal { .. })
    }
}

/// Errors raised while starting the engine.
#[derive(Error, Debug)]
pub enum TunerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to spawn the estimation thread: {0}")]
    Spawn(#[from] std::io::Error),
}
