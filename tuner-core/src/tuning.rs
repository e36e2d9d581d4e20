//! # Musical Tuning Module
//!
//! Target-note tables and the nearest-note lookup used to turn a measured
//! frequency into a note name and tuning offset.
//!
//! ## Features
//! - Standard six-string guitar table (EADGBE)
//! - Full equal-tempered chromatic table, A0 to C8 (A4 = 440 Hz)
//! - Nearest-target matching with a deterministic tie-break
//! - Cent deviation calculations

use crate::config::ConfigError;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Represents a single target note with its name and frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Note name (e.g., "E2", "C#3")
    pub name: String,
    /// Frequency in Hz
    pub frequency: f32,
}

/// Standard guitar tuning, low E to high E.
pub const GUITAR_STANDARD: [(&str, f32); 6] = [
    ("E2", 82.41),
    ("A2", 110.00),
    ("D3", 146.83),
    ("G3", 196.00),
    ("B3", 246.94),
    ("E4", 329.63),
];

/// The 88 equal-tempered notes of a piano keyboard, A0 to C8.
static CHROMATIC: Lazy<Vec<Note>> = Lazy::new(|| {
    const NOTE_NAMES: [&str; 12] = [
        "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
    ];
    (0..88)
        .map(|i| {
            // A4 is key 48 counting from A0; f = 440 * 2^(n/12).
            let frequency = 440.0 * 2.0_f32.powf((i as f32 - 48.0) / 12.0);
            // The octave number changes at C.
            let octave = (i + 9) / 12;
            Note {
                name: format!("{}{}", NOTE_NAMES[i % 12], octave),
                frequency,
            }
        })
        .collect()
});

/// Non-empty set of target notes, kept sorted by ascending frequency
/// (then by name).
#[derive(Debug, Clone, PartialEq)]
pub struct TargetNoteTable {
    notes: Vec<Note>,
}

impl TargetNoteTable {
    /// Builds a table from `(name, frequency)` pairs.
    ///
    /// Fails if the table is empty or any frequency is not a finite,
    /// positive number.
    pub fn new<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut notes = Vec::new();
        for (name, frequency) in entries {
            let name = name.into();
            if !frequency.is_finite() || frequency <= 0.0 {
                return Err(ConfigError::InvalidNoteFrequency { name, frequency });
            }
            notes.push(Note { name, frequency });
        }
        if notes.is_empty() {
            return Err(ConfigError::EmptyNoteTable);
        }
        notes.sort_by(|a, b| {
            a.frequency
                .total_cmp(&b.frequency)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(Self { notes })
    }

    pub fn from_map(map: &BTreeMap<String, f32>) -> Result<Self, ConfigError> {
        Self::new(map.iter().map(|(name, &freq)| (name.clone(), freq)))
    }

    pub fn guitar_standard() -> Self {
        Self {
            notes: GUITAR_STANDARD
                .iter()
                .map(|&(name, frequency)| Note {
                    name: name.to_string(),
                    frequency,
                })
                .collect(),
        }
    }

    pub fn chromatic() -> Self {
        Self {
            notes: CHROMATIC.clone(),
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Always false for a constructed table; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, f32> {
        self.notes
            .iter()
            .map(|n| (n.name.clone(), n.frequency))
            .collect()
    }
}

/// Finds the table entry closest to a measured frequency.
#[derive(Debug, Clone)]
pub struct NoteMatcher {
    table: TargetNoteTable,
}

impl NoteMatcher {
    pub fn new(table: TargetNoteTable) -> Self {
        Self { table }
    }

    /// Returns the note minimising `|note.frequency - freq|`.
    ///
    /// Exact ties go to the lower target frequency: the scan runs in
    /// ascending order and only a strictly smaller distance replaces the
    /// current best.
    pub fn nearest(&self, freq: f32) -> &Note {
        let notes = &self.table.notes;
        let mut best = 0;
        let mut best_distance = (notes[0].frequency - freq).abs();
        for (i, note) in notes.iter().enumerate().skip(1) {
            let distance = (note.frequency - freq).abs();
            if distance < best_distance {
                best = i;
                best_distance = distance;
            }
        }
        &notes[best]
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents = 1 semitone; positive values are sharp, negative flat.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
