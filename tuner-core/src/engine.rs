//! # Tuner Engine Module
//!
//! Drives the periodic estimation cycle.
//!
//! ## Architecture
//! - **Producer**: the audio backend calls [`SampleProducer::push_samples`]
//!   from its callback. It only ever takes the buffer lock for one copy.
//! - **Consumer**: every `HOP_TIME` the engine snapshots the buffer, drops
//!   the lock, and runs gating, YIN, smoothing and note matching on the copy.
//! - **Sink**: each cycle's [`TunerEvent`] goes to an [`EventSink`]. The
//!   channel sink never blocks, so a slow UI cannot stall the loop.
//!
//! A reset bumps the buffer's generation under the same lock as `push`;
//! the tracker notices the new generation in the next snapshot and drops
//! its noise and smoothing state before using that frame.

use crate::buffer::{SlidingBuffer, Snapshot};
use crate::config::{ConfigError, TunerConfig};
use crate::fft::{apply_hann_window, peak_amplitude, remove_dc_offset, rms};
use crate::noise::NoiseFloorEstimator;
use crate::pitch::YinEstimator;
use crate::smoothing::FrequencySmoother;
use crate::tuning::{calculate_cents_deviation, NoteMatcher, TargetNoteTable};
use crate::{NoSignalReason, PitchEvent, TunerError, TunerEvent, AMP_EPSILON};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Whether the last cycle found a pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerState {
    NoSignal,
    Detected,
}

/// Consumer-side state: noise floor, smoother and the YIN work buffers.
///
/// Turns one snapshot into one event. Never touches the shared buffer.
pub struct PitchTracker {
    noise: NoiseFloorEstimator,
    yin: YinEstimator,
    smoother: FrequencySmoother,
    matcher: NoteMatcher,
    state: TunerState,
    generation: u64,
}

impl PitchTracker {
    pub fn new(config: &TunerConfig, table: TargetNoteTable) -> Self {
        Self {
            noise: NoiseFloorEstimator::new(
                config.rms_active_threshold,
                config.alpha,
                config.rms_min,
                config.rms_max,
            ),
            yin: YinEstimator::new(config.yin_params()),
            smoother: FrequencySmoother::new(config.smooth_alpha),
            matcher: NoteMatcher::new(table),
            state: TunerState::NoSignal,
            generation: 0,
        }
    }

    pub fn state(&self) -> TunerState {
        self.state
    }

    pub fn noise(&self) -> &NoiseFloorEstimator {
        &self.noise
    }

    /// Runs steps 2-8 of a cycle on an already copied snapshot.
    pub fn process(&mut self, snapshot: Snapshot) -> TunerEvent {
        if snapshot.generation != self.generation {
            debug!(
                from = self.generation,
                to = snapshot.generation,
                "Input was reset, clearing noise floor and smoothing"
            );
            self.reset();
            self.generation = snapshot.generation;
        }

        let mut frame = snapshot.samples;
        if peak_amplitude(&frame) < AMP_EPSILON {
            return self.no_signal(NoSignalReason::Silence);
        }

        remove_dc_offset(&mut frame);
        let level = rms(&frame);
        self.noise.observe(level);
        if !self.noise.is_signal(level) {
            trace!(
                rms = level,
                gate = self.noise.adaptive_threshold(),
                "Frame below noise gate"
            );
            return self.no_signal(NoSignalReason::BelowGate);
        }

        apply_hann_window(&mut frame);
        let estimate = self.yin.estimate(&frame);
        if !estimate.is_usable() {
            return self.no_signal(NoSignalReason::Aperiodic);
        }

        let frequency = self.smoother.smooth(estimate.frequency_hz);
        let note = self.matcher.nearest(frequency);
        let event = PitchEvent {
            note: note.name.clone(),
            frequency_hz: frequency,
            target_hz: note.frequency,
            offset_hz: frequency - note.frequency,
            cents: calculate_cents_deviation(frequency, note.frequency),
        };
        self.enter(TunerState::Detected);
        TunerEvent::Pitch(event)
    }

    /// Forgets the noise floor and the smoothed pitch.
    pub fn reset(&mut self) {
        self.noise.reset();
        self.smoother.reset();
        self.enter(TunerState::NoSignal);
    }

    fn no_signal(&mut self, reason: NoSignalReason) -> TunerEvent {
        self.enter(TunerState::NoSignal);
        TunerEvent::NoSignal { reason }
    }

    fn enter(&mut self, state: TunerState) {
        if self.state != state {
            debug!(?state, "Tuner state changed");
            self.state = state;
        }
    }
}

/// Producer handle given to the audio backend.
///
/// Cheap to clone; every clone feeds the same buffer.
#[derive(Debug, Clone)]
pub struct SampleProducer {
    buffer: Arc<SlidingBuffer>,
    sample_rate: u32,
    rate_warned: Arc<AtomicBool>,
}

impl SampleProducer {
    /// Pushes a chunk captured at `source_rate`.
    ///
    /// The chunk is always accepted; a rate other than the configured one is
    /// reported once, since resampling belongs to the backend.
    pub fn push_samples(&self, chunk: &[f32], source_rate: u32) {
        if source_rate != self.sample_rate && !self.rate_warned.swap(true, Ordering::Relaxed) {
            warn!(
                expected = self.sample_rate,
                actual = source_rate,
                "Sample rate mismatch, pitch readings will be scaled"
            );
        }
        self.buffer.push(chunk);
    }

    /// Zeroes the buffer and invalidates the noise and smoothing state.
    /// Call on a device or source change.
    pub fn reset(&self) {
        let generation = self.buffer.reset();
        self.rate_warned.store(false, Ordering::Relaxed);
        info!(generation, "Tuner input reset");
    }
}

/// Receives one event per cycle.
///
/// Runs on the engine thread, so implementations must return promptly. A
/// panic inside `deliver` loses that event but does not stop the loop.
pub trait EventSink: Send + 'static {
    fn deliver(&mut self, event: TunerEvent);
}

impl<F> EventSink for F
where
    F: FnMut(TunerEvent) + Send + 'static,
{
    fn deliver(&mut self, event: TunerEvent) {
        self(event)
    }
}

/// Non-blocking hand-off to another thread through a crossbeam channel.
///
/// Events are dropped while the channel is full.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<TunerEvent>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(sender: Sender<TunerEvent>) -> Self {
        Self { sender, dropped: 0 }
    }

    /// Creates a sink with its own bounded channel.
    pub fn bounded(capacity: usize) -> (Self, Receiver<TunerEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl EventSink for ChannelSink {
    fn deliver(&mut self, event: TunerEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                trace!(dropped = self.dropped, "Event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("Event receiver gone");
            }
        }
    }
}

/// Owns all tuner state for one audio session.
pub struct TunerEngine {
    config: TunerConfig,
    hop: Duration,
    buffer: Arc<SlidingBuffer>,
    tracker: PitchTracker,
    producer: SampleProducer,
}

impl TunerEngine {
    /// Validates `config` and builds an idle engine with a zeroed buffer.
    pub fn new(config: TunerConfig) -> Result<Self, ConfigError> {
        let table = config.validate()?;
        let hop = config.hop_duration()?;
        let buffer = Arc::new(SlidingBuffer::new(config.win_size));
        let tracker = PitchTracker::new(&config, table);
        let producer = SampleProducer {
            buffer: Arc::clone(&buffer),
            sample_rate: config.fs,
            rate_warned: Arc::new(AtomicBool::new(false)),
        };
        Ok(Self {
            config,
            hop,
            buffer,
            tracker,
            producer,
        })
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn producer(&self) -> SampleProducer {
        self.producer.clone()
    }

    pub fn push_samples(&self, chunk: &[f32], source_rate: u32) {
        self.producer.push_samples(chunk, source_rate);
    }

    pub fn reset(&self) {
        self.producer.reset();
    }

    pub fn state(&self) -> TunerState {
        self.tracker.state()
    }

    pub fn tracker(&self) -> &PitchTracker {
        &self.tracker
    }

    /// Runs one estimation cycle synchronously.
    ///
    /// The buffer lock is held only for the snapshot copy. A panic inside
    /// the analysis is reported as `NoSignal` for this cycle only.
    pub fn tick(&mut self) -> TunerEvent {
        let snapshot = self.buffer.snapshot();
        let tracker = &mut self.tracker;
        match panic::catch_unwind(AssertUnwindSafe(|| tracker.process(snapshot))) {
            Ok(event) => event,
            Err(_) => {
                warn!("Pitch analysis panicked, skipping this cycle");
                self.tracker.enter(TunerState::NoSignal);
                TunerEvent::NoSignal {
                    reason: NoSignalReason::AnalysisFailed,
                }
            }
        }
    }

    /// Moves the engine onto its own thread and starts the periodic loop.
    pub fn spawn<S: EventSink>(self, sink: S) -> Result<EngineHandle, TunerError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let producer = self.producer();
        let hop = self.hop;
        let thread_stop = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("tuner-engine".into())
            .spawn(move || {
                let mut engine = self;
                let mut sink = sink;
                info!(hop_ms = hop.as_millis() as u64, "Estimation loop started");

                while !thread_stop.load(Ordering::Acquire) {
                    match shutdown_rx.recv_timeout(hop) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let event = engine.tick();
                    let delivered =
                        panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(event)));
                    if delivered.is_err() {
                        warn!("Event sink panicked, event discarded");
                    }
                }

                info!("Estimation loop stopped");
            })?;

        Ok(EngineHandle {
            stop,
            shutdown_tx,
            thread: Some(thread),
            producer,
        })
    }
}

/// Handle to a running engine. Dropping it stops the engine.
#[derive(Debug)]
pub struct EngineHandle {
    stop: Arc<AtomicBool>,
    shutdown_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
    producer: SampleProducer,
}

impl EngineHandle {
    pub fn producer(&self) -> SampleProducer {
        self.producer.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signals the loop and waits for the in-flight cycle to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Wakes the loop if it is sleeping between cycles.
        let _ = self.shutdown_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Estimation thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
