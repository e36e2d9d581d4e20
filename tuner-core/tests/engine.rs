use approx::assert_abs_diff_eq;
use std::thread;
use std::time::{Duration, Instant};
use tuner_core::{
    ChannelSink, ConfigError, NoSignalReason, TunerConfig, TunerEngine, TunerEvent, TunerState,
};

const FS: u32 = 44100;
const CHUNK: usize = 1024;

/// Continuous sine generator so chunk boundaries carry no phase jumps.
struct Tone {
    freq: f32,
    amplitude: f32,
    position: u64,
}

impl Tone {
    fn new(freq: f32, amplitude: f32) -> Self {
        Self {
            freq,
            amplitude,
            position: 0,
        }
    }

    fn chunk(&mut self, len: usize) -> Vec<f32> {
        let start = self.position;
        self.position += len as u64;
        (0..len as u64)
            .map(|i| {
                let t = (start + i) as f64 / FS as f64;
                self.amplitude * (2.0 * std::f64::consts::PI * self.freq as f64 * t).sin() as f32
            })
            .collect()
    }
}

fn feed(engine: &TunerEngine, tone: &mut Tone, samples: usize) {
    for _ in 0..samples.div_ceil(CHUNK) {
        engine.push_samples(&tone.chunk(CHUNK), FS);
    }
}

fn engine() -> TunerEngine {
    TunerEngine::new(TunerConfig::guitar_standard()).unwrap()
}

#[test]
fn low_e_string_is_detected() {
    let mut engine = engine();
    let mut tone = Tone::new(82.41, 0.5);
    feed(&engine, &mut tone, engine.config().win_size);

    let mut last = None;
    for _ in 0..5 {
        feed(&engine, &mut tone, 1764);
        last = Some(engine.tick());
    }

    let event = last.unwrap();
    let pitch = event.pitch().expect("expected a pitch event");
    assert_eq!(pitch.note, "E2");
    assert_abs_diff_eq!(pitch.frequency_hz, 82.41, epsilon = 1.0);
    assert_abs_diff_eq!(pitch.offset_hz, 0.0, epsilon = 1.0);
    assert_abs_diff_eq!(pitch.target_hz, 82.41, epsilon = 1e-4);
    assert_eq!(engine.state(), TunerState::Detected);
}

#[test]
fn every_open_string_maps_to_its_note() {
    for (name, freq) in [
        ("E2", 82.41),
        ("A2", 110.0),
        ("D3", 146.83),
        ("G3", 196.0),
        ("B3", 246.94),
        ("E4", 329.63),
    ] {
        let mut engine = engine();
        let mut tone = Tone::new(freq, 0.3);
        feed(&engine, &mut tone, 8192);
        let event = engine.tick();
        let pitch = event.pitch().unwrap_or_else(|| panic!("no pitch for {name}"));
        assert_eq!(pitch.note, name);
        assert_abs_diff_eq!(pitch.offset_hz, 0.0, epsilon = 1.0);
    }
}

#[test]
fn detuned_string_reports_offset() {
    let mut engine = engine();
    let mut tone = Tone::new(112.0, 0.5);
    feed(&engine, &mut tone, 8192);

    let event = engine.tick();
    let pitch = event.pitch().expect("pitch");
    assert_eq!(pitch.note, "A2");
    assert_abs_diff_eq!(pitch.offset_hz, 2.0, epsilon = 0.5);
    assert!(pitch.cents > 0.0);
}

#[test]
fn silence_never_yields_a_pitch() {
    let mut engine = engine();
    for _ in 0..10 {
        engine.push_samples(&[0.0; CHUNK], FS);
        let event = engine.tick();
        assert_eq!(
            event,
            TunerEvent::NoSignal {
                reason: NoSignalReason::Silence
            }
        );
    }
    assert_eq!(engine.state(), TunerState::NoSignal);
}

#[test]
fn untouched_engine_reports_no_signal() {
    let mut engine = engine();
    assert!(engine.tick().is_no_signal());
}

#[test]
fn loud_notes_do_not_raise_the_noise_floor() {
    let mut engine = engine();

    // Room hum well under the quiet threshold.
    let mut hum = Tone::new(50.0, 4e-4);
    for _ in 0..5 {
        feed(&engine, &mut hum, 8192);
        assert_eq!(
            engine.tick(),
            TunerEvent::NoSignal {
                reason: NoSignalReason::BelowGate
            }
        );
    }
    let floor = engine.tracker().noise().noise_rms();
    assert!(floor > 1e-8);

    let mut note = Tone::new(110.0, 0.5);
    for _ in 0..5 {
        feed(&engine, &mut note, 8192);
        assert!(engine.tick().pitch().is_some());
    }
    assert_eq!(engine.tracker().noise().noise_rms(), floor);
}

#[test]
fn reset_clears_buffer_and_state() {
    let mut engine = engine();
    let mut tone = Tone::new(196.0, 0.4);
    feed(&engine, &mut tone, 8192);
    assert!(engine.tick().pitch().is_some());

    engine.reset();
    assert_eq!(
        engine.tick(),
        TunerEvent::NoSignal {
            reason: NoSignalReason::Silence
        }
    );
    assert_eq!(engine.state(), TunerState::NoSignal);

    // The smoother bootstraps again on the new source.
    let mut other = Tone::new(329.63, 0.4);
    feed(&engine, &mut other, 8192);
    let event = engine.tick();
    let pitch = event.pitch().expect("pitch");
    assert_eq!(pitch.note, "E4");
    assert_abs_diff_eq!(pitch.offset_hz, 0.0, epsilon = 1.0);
}

#[test]
fn mismatched_rate_is_still_accepted() {
    let mut engine = engine();
    let mut tone = Tone::new(110.0, 0.5);
    for _ in 0..8 {
        engine.push_samples(&tone.chunk(CHUNK), 48000);
    }
    assert!(engine.tick().pitch().is_some());
}

#[test]
fn empty_note_table_fails_construction() {
    let mut config = TunerConfig::guitar_standard();
    config.target_freqs.clear();
    assert!(matches!(
        TunerEngine::new(config),
        Err(ConfigError::EmptyNoteTable)
    ));
}

#[test]
fn unrepresentable_hop_time_fails_construction() {
    for hop_time in [1e30, 1e-12] {
        let mut config = TunerConfig::guitar_standard();
        config.hop_time = hop_time;
        assert!(matches!(
            TunerEngine::new(config),
            Err(ConfigError::InvalidHopTime(_))
        ));
    }
}

#[test]
fn threaded_engine_emits_pitch_events() {
    let mut config = TunerConfig::guitar_standard();
    config.hop_time = 0.01;
    let engine = TunerEngine::new(config).unwrap();
    let (sink, events) = ChannelSink::bounded(64);
    let handle = engine.spawn(sink).unwrap();
    assert!(handle.is_running());

    let producer = handle.producer();
    let feeder = thread::spawn(move || {
        let mut tone = Tone::new(82.41, 0.5);
        for _ in 0..200 {
            producer.push_samples(&tone.chunk(441), FS);
            thread::sleep(Duration::from_millis(10));
        }
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut found = None;
    while Instant::now() < deadline {
        // Early events come from a partly filled window; wait for the
        // smoothed reading to settle on the string.
        if let Ok(TunerEvent::Pitch(pitch)) = events.recv_timeout(Duration::from_millis(100)) {
            if pitch.note == "E2" && (pitch.frequency_hz - 82.41).abs() < 1.0 {
                found = Some(pitch);
                break;
            }
        }
    }

    handle.stop();
    feeder.join().unwrap();

    let pitch = found.expect("no settled E2 event from the running engine");
    assert_abs_diff_eq!(pitch.offset_hz, 0.0, epsilon = 1.0);
}

#[test]
fn stop_wakes_a_sleeping_loop() {
    let mut config = TunerConfig::guitar_standard();
    config.hop_time = 30.0;
    let engine = TunerEngine::new(config).unwrap();
    let (sink, _events) = ChannelSink::bounded(1);
    let handle = engine.spawn(sink).unwrap();

    let started = Instant::now();
    handle.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn closure_sink_runs_on_engine_thread() {
    let mut config = TunerConfig::guitar_standard();
    config.hop_time = 0.005;
    let engine = TunerEngine::new(config).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = engine
        .spawn(move |event: TunerEvent| {
            let name = thread::current().name().map(str::to_owned);
            let _ = tx.send((name, event));
        })
        .unwrap();

    let (name, event) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    drop(handle);

    assert_eq!(name.as_deref(), Some("tuner-engine"));
    assert!(event.is_no_signal());
}

#[test]
fn panicking_sink_does_not_stop_the_loop() {
    let mut config = TunerConfig::guitar_standard();
    config.hop_time = 0.005;
    let engine = TunerEngine::new(config).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut calls = 0u32;
    let handle = engine
        .spawn(move |event: TunerEvent| {
            calls += 1;
            if calls == 1 {
                panic!("sink failure");
            }
            let _ = tx.send(event);
        })
        .unwrap();

    let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(event.is_no_signal());
    assert!(handle.is_running());
    handle.stop();
}
