//! # Terminal Tuner
//!
//! Captures audio from an input device, runs the tuner engine and redraws a
//! coloured tuning bar in the terminal.
//!
//! ## Architecture
//! - **Audio callback**: CPAL pushes mono chunks into the engine's buffer
//! - **Engine thread**: estimates pitch every `HOP_TIME`
//! - **Main thread**: drains engine events from a crossbeam channel and
//!   renders the latest one

mod audio;
mod render;
mod settings;

use anyhow::{bail, Context, Result};
use cpal::traits::StreamTrait;
use crossbeam_channel::RecvTimeoutError;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tuner_core::tuning::TargetNoteTable;
use tuner_core::{ChannelSink, TunerEngine};

/// Poll interval of the render loop while waiting for events.
const RENDER_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Options {
    list: bool,
    chromatic: bool,
    device: Option<String>,
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Logs go to stderr so the tuning line on stdout stays intact.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tuner_term=info,tuner_core=info")),
        )
        .init();

    let options = match parse_args(std::env::args().skip(1))? {
        Some(options) => options,
        None => {
            print_usage();
            return Ok(());
        }
    };

    if options.list {
        return list_devices();
    }
    run(options)
}

/// Returns `None` when help was requested.
fn parse_args(args: impl Iterator<Item = String>) -> Result<Option<Options>> {
    let mut options = Options::default();
    let mut args = args;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list" | "-l" => options.list = true,
            "--chromatic" => options.chromatic = true,
            "--device" | "-d" => {
                let name = args.next().context("--device requires a device name")?;
                options.device = Some(name);
            }
            "--config" | "-c" => {
                let path = args.next().context("--config requires a file path")?;
                options.config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Ok(None),
            other => bail!("Unknown argument: {other} (try --help)"),
        }
    }
    Ok(Some(options))
}

fn print_usage() {
    println!("Usage: tuner-term [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -l, --list            List input devices and exit");
    println!("  -d, --device <NAME>   Capture from the named input device");
    println!("  -c, --config <FILE>   Load tuner and display settings from a JSON file");
    println!("      --chromatic       Match against every note from A0 to C8");
    println!("  -h, --help            Show this help");
}

fn list_devices() -> Result<()> {
    let devices = audio::list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found.");
    }
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{}{}", device.name, marker);
    }
    Ok(())
}

fn run(options: Options) -> Result<()> {
    let mut settings = settings::load(options.config.as_deref())?;
    if options.chromatic {
        settings.tuner.target_freqs = TargetNoteTable::chromatic().to_map();
    }
    let sample_rate = settings.tuner.fs;

    let engine =
        TunerEngine::new(settings.tuner.clone()).context("Invalid tuner configuration")?;
    let producer = engine.producer();
    let (sink, events) = ChannelSink::bounded(16);
    let handle = engine.spawn(sink)?;

    let stream = audio::start_audio_capture(options.device.as_deref(), sample_rate, producer)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to install the Ctrl+C handler")?;
    }

    println!("Tuner running, Ctrl+C to quit.");
    let mut stdout = io::stdout();

    while running.load(Ordering::SeqCst) {
        let mut latest = match events.recv_timeout(RENDER_POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                error!("Engine stopped unexpectedly");
                break;
            }
        };
        // Only the newest reading matters.
        while let Ok(event) = events.try_recv() {
            latest = event;
        }

        write!(stdout, "\r{}   ", render::status_line(&latest, &settings.display))?;
        stdout.flush()?;
    }

    println!();
    info!("Shutting down");
    if let Err(e) = stream.pause() {
        error!(%e, "Error pausing stream");
    }
    drop(stream);
    handle.stop();
    Ok(())
}
