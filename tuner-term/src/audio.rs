//! # Audio Capture Module
//!
//! Real-time capture through CPAL (Cross-Platform Audio Library). This is
//! the backend the tuner core treats as external: it lists and opens input
//! devices and feeds mono sample chunks into a [`SampleProducer`].
//!
//! ## Features
//! - Input device enumeration and selection by name
//! - F32 and I16 device formats, normalised to `[-1, 1]`
//! - First channel of multi-channel devices

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, SupportedStreamConfigRange};
use tracing::{error, info};
use tuner_core::SampleProducer;

/// An available input device.
#[derive(Debug, Clone)]
pub struct InputDevice {
    pub name: String,
    pub is_default: bool,
}

/// Lists the input devices of the default host.
pub fn list_input_devices() -> Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?
        .filter_map(|device| device.name().ok())
        .map(|name| InputDevice {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        })
        .collect();
    Ok(devices)
}

/// Starts capturing from `device_name` (or the default input) at `sample_rate`.
///
/// The producer is reset before the stream starts so the tuner never mixes
/// samples or noise statistics from a previous device.
///
/// # Returns
/// * `Ok(stream)` - Running stream; capture stops when it is dropped
/// * `Err(e)` - No device, no usable format, or the stream failed to start
pub fn start_audio_capture(
    device_name: Option<&str>,
    sample_rate: u32,
    producer: SampleProducer,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;
    let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    info!(device = %name, "Using audio input device");

    let configs = device
        .supported_input_configs()
        .context("Failed to query input configurations")?
        .collect::<Vec<_>>();
    let supported = find_supported_config(configs, sample_rate).ok_or_else(|| {
        anyhow!("Device {name} has no F32 or I16 input format at {sample_rate} Hz")
    })?;

    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported
        .with_sample_rate(cpal::SampleRate(sample_rate))
        .into();
    info!(
        sample_rate,
        channels = config.channels,
        format = ?format,
        "Selected input configuration"
    );

    producer.reset();
    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, producer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, producer)?,
        other => return Err(anyhow!("Unsupported sample format {other:?}")),
    };
    stream.play().context("Failed to start the input stream")?;

    Ok(stream)
}

fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<cpal::Device> {
    match device_name {
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available")),
        Some(wanted) => host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| anyhow!("Input device not found: {wanted}")),
    }
}

/// Picks a configuration covering `target_rate`, preferring fewer channels
/// and float samples.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16))
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| (c.channels(), c.sample_format() != SampleFormat::F32))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    producer: SampleProducer,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let rate = config.sample_rate.0;
    // Reused across callbacks.
    let mut mono: Vec<f32> = Vec::with_capacity(4096);

    let err_fn = |err: cpal::StreamError| error!(%err, "An error occurred on the audio stream");

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            mono.clear();
            mono.extend(data.iter().step_by(channels).map(|s| s.to_sample::<f32>()));
            producer.push_samples(&mono, rate);
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
