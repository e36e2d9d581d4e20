//! Terminal rendering of tuner events.
//!
//! A single status line, `"{note}: {freq} Hz {bar}"`, redrawn in place. The
//! bar spans `target ± BAR_SPAN/2`; every cell is coloured by its distance
//! from the target, blue (flat) through green (in tune) to red (sharp),
//! using ANSI truecolor escapes.

use crate::settings::DisplaySettings;
use tuner_core::TunerEvent;

const RESET: &str = "\x1b[0m";

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round() as u8
}

/// Colour for an offset of `diff_hz`, saturating at `±span`.
pub fn rgb_for_diff(diff_hz: f32, span: f32) -> (u8, u8, u8) {
    let t = (diff_hz / span).clamp(-1.0, 1.0);
    if t <= -0.5 {
        // blue -> cyan
        let s = (t + 1.0) / 0.5;
        (0, lerp(0, 255, s), 255)
    } else if t <= 0.0 {
        // cyan -> green
        let s = (t + 0.5) / 0.5;
        (0, 255, lerp(255, 0, s))
    } else if t <= 0.5 {
        // green -> yellow
        let s = t / 0.5;
        (lerp(0, 255, s), 255, 0)
    } else {
        // yellow -> red
        let s = (t - 0.5) / 0.5;
        (255, lerp(255, 0, s), 0)
    }
}

fn truecolor((r, g, b): (u8, u8, u8)) -> String {
    format!("\x1b[38;2;{r};{g};{b}m")
}

/// Index of the bar cell that represents `current`.
pub fn cursor_position(current: f32, target: f32, display: &DisplaySettings) -> usize {
    let width = display.bar_width;
    let low = target - display.bar_span / 2.0;
    let pos = ((current - low) / display.bar_span * (width - 1) as f32).round();
    if pos.is_nan() {
        return width / 2;
    }
    pos.clamp(0.0, (width - 1) as f32) as usize
}

/// Coloured bar with a cursor at `current`.
pub fn tuning_bar(current: f32, target: f32, display: &DisplaySettings) -> String {
    let width = display.bar_width;
    let half_span = display.bar_span / 2.0;
    let low = target - half_span;
    let center = width / 2;
    let cursor = cursor_position(current, target, display);

    let mut out = String::with_capacity(width * 24);
    for i in 0..width {
        let (color, glyph) = if i == cursor {
            let glyph = if cursor == center { '│' } else { '⭢' };
            (rgb_for_diff(current - target, half_span), glyph)
        } else {
            let cell_freq = low + (i as f32 / (width - 1) as f32) * display.bar_span;
            let glyph = if i == center { '+' } else { '-' };
            (rgb_for_diff(cell_freq - target, half_span), glyph)
        };
        out.push_str(&truecolor(color));
        out.push(glyph);
        out.push_str(RESET);
    }
    out
}

/// Full status line for one event, without the leading carriage return.
pub fn status_line(event: &TunerEvent, display: &DisplaySettings) -> String {
    match event {
        TunerEvent::Pitch(pitch) => format!(
            "{}: {:6.2} Hz {:+6.1}c {}",
            pitch.note,
            pitch.frequency_hz,
            pitch.cents,
            tuning_bar(pitch.frequency_hz, pitch.target_hz, display)
        ),
        TunerEvent::NoSignal { .. } => {
            format!("--: {:>6} Hz {:>7} {}", "--", "", " ".repeat(display.bar_width))
        }
    }
}
