//! Musical keys on the Camelot wheel
//!
//! The 24 major/minor keys are laid out as 12 wheel positions with two rings:
//! `A` (minor) and `B` (major). Relative keys share a wheel number, and
//! neighbouring numbers are a perfect fifth apart.
//!
//! Key distance is the circular distance between wheel numbers (0-6) plus one
//! step when the ring differs, so the largest possible distance is 7. The
//! distance is a metric, which the heuristic search relies on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest distance between two keys on the wheel
pub const MAX_KEY_DISTANCE: u8 = 7;

/// Ring of the Camelot wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Inner ring (`A`)
    Minor,
    /// Outer ring (`B`)
    Major,
}

/// Key notation that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognized musical key: '{0}'")]
pub struct KeyParseError(pub String);

/// A musical key, stored as a Camelot wheel position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MusicalKey {
    number: u8,
    mode: Mode,
}

const NOTE_NAMES: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B"];

impl MusicalKey {
    /// Build from a Camelot wheel number (1-12) and ring
    pub fn camelot(number: u8, mode: Mode) -> Option<Self> {
        (1..=12).contains(&number).then_some(Self { number, mode })
    }

    /// Build from a pitch class (0 = C, 11 = B) and mode
    pub fn from_pitch_class(pitch_class: u8, mode: Mode) -> Self {
        let pc = pitch_class % 12;
        // Minor keys sit on the wheel number of their relative major
        let major_pc = match mode {
            Mode::Major => pc,
            Mode::Minor => (pc + 3) % 12,
        };
        // C major is 8B; each fifth up adds one
        let number = ((major_pc * 7) % 12 + 7) % 12 + 1;
        Self { number, mode }
    }

    /// Wheel number (1-12)
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Ring (minor/major)
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Pitch class of the tonic (0 = C)
    pub fn pitch_class(&self) -> u8 {
        // Inverse of from_pitch_class: 7 is its own inverse modulo 12
        let major_pc = ((self.number + 12 - 8) % 12 * 7) % 12;
        match self.mode {
            Mode::Major => major_pc,
            Mode::Minor => (major_pc + 9) % 12,
        }
    }

    /// Steps between two keys on the wheel (0-7)
    pub fn distance(&self, other: &MusicalKey) -> u8 {
        let diff = self.number.abs_diff(other.number);
        let circular = diff.min(12 - diff);
        circular + u8::from(self.mode != other.mode)
    }

    /// Human-readable key name, e.g. "A minor"
    pub fn name(&self) -> String {
        let tonic = NOTE_NAMES[usize::from(self.pitch_class())];
        match self.mode {
            Mode::Major => format!("{} major", tonic),
            Mode::Minor => format!("{} minor", tonic),
        }
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = match self.mode {
            Mode::Minor => 'A',
            Mode::Major => 'B',
        };
        write!(f, "{}{}", self.number, ring)
    }
}

impl FromStr for MusicalKey {
    type Err = KeyParseError;

    /// Accepts Camelot codes (`8A`, `12b`) and note names (`Am`, `C#`,
    /// `F# minor`, `Bb major`, `Ebmin`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        parse_camelot(trimmed)
            .or_else(|| parse_note_name(trimmed))
            .ok_or_else(|| KeyParseError(s.to_string()))
    }
}

impl TryFrom<String> for MusicalKey {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MusicalKey> for String {
    fn from(key: MusicalKey) -> Self {
        key.to_string()
    }
}

fn parse_camelot(s: &str) -> Option<MusicalKey> {
    let ring = s.chars().last()?;
    let digits = &s[..s.len() - ring.len_utf8()];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let number: u8 = digits.parse().ok()?;
    let mode = match ring.to_ascii_uppercase() {
        'A' => Mode::Minor,
        'B' => Mode::Major,
        _ => return None,
    };
    MusicalKey::camelot(number, mode)
}

fn parse_note_name(s: &str) -> Option<MusicalKey> {
    let mut chars = s.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base: i8 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let sharp = rest.strip_prefix('#').or_else(|| rest.strip_prefix('♯'));
    let (accidental, rest): (i8, &str) = if let Some(r) = sharp {
        (1, r)
    } else if let Some(r) = rest.strip_prefix('b').or_else(|| rest.strip_prefix('♭')) {
        (-1, r)
    } else {
        (0, rest)
    };

    let mode = match rest.trim().to_ascii_lowercase().as_str() {
        "" | "maj" | "major" => Mode::Major,
        "m" | "min" | "minor" => Mode::Minor,
        _ => return None,
    };

    let pitch_class = (base + accidental).rem_euclid(12) as u8;
    Some(MusicalKey::from_pitch_class(pitch_class, mode))
}
