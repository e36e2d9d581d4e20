//! Settings file loading.
//!
//! One JSON document carries both the tuner options (`FS`, `WIN_SIZE`, ...)
//! and the display options (`BAR_WIDTH`, `BAR_SPAN`). Each half is
//! deserialised on its own and ignores the other half's keys.

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tuner_core::TunerConfig;

/// Presentation options for the terminal bar.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DisplaySettings {
    /// Number of cells in the bar.
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,
    /// Frequency range covered by the bar, in Hz, centred on the target.
    #[serde(default = "default_bar_span")]
    pub bar_span: f32,
}

fn default_bar_width() -> usize {
    56
}

fn default_bar_span() -> f32 {
    10.0
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            bar_width: default_bar_width(),
            bar_span: default_bar_span(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub tuner: TunerConfig,
    pub display: DisplaySettings,
}

/// Loads settings from `path`, or returns the guitar preset.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings {
            tuner: TunerConfig::guitar_standard(),
            display: DisplaySettings::default(),
        });
    };

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    parse(&text).with_context(|| format!("Invalid settings in {}", path.display()))
}

fn parse(text: &str) -> Result<Settings> {
    let tuner: TunerConfig = serde_json::from_str(text)?;
    tuner.validate()?;
    let display: DisplaySettings = serde_json::from_str(text)?;
    ensure!(display.bar_width >= 3, "BAR_WIDTH must be at least 3");
    ensure!(
        display.bar_span.is_finite() && display.bar_span > 0.0,
        "BAR_SPAN must be a positive number of Hz"
    );
    Ok(Settings { tuner, display })
}
