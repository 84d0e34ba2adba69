//! Note labels
//!
//! Formats MIDI numbers as note names in one of two spellings and persists the
//! user's choice through a [`PreferenceStore`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PreferenceError;
use crate::prefs::PreferenceStore;

/// Key the notation preference is stored under.
pub const NOTATION_KEY: &str = "notation";

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const FLAT_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotationScheme {
    #[default]
    Sharps,
    Flats,
}

impl NotationScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotationScheme::Sharps => "sharps",
            NotationScheme::Flats => "flats",
        }
    }

    /// Read the stored scheme, falling back to the default when nothing usable is stored.
    pub fn load(store: &dyn PreferenceStore) -> Self {
        match store.get(NOTATION_KEY) {
            Ok(Some(value)) => value.parse().unwrap_or_else(|_| {
                warn!(value = %value, "ignoring unknown notation preference");
                NotationScheme::default()
            }),
            Ok(None) => NotationScheme::default(),
            Err(e) => {
                warn!(error = %e, "could not read notation preference");
                NotationScheme::default()
            }
        }
    }

    pub fn save(&self, store: &mut dyn PreferenceStore) -> Result<(), PreferenceError> {
        store.set(NOTATION_KEY, self.as_str())
    }
}

impl fmt::Display for NotationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotationScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sharps" | "sharp" => Ok(NotationScheme::Sharps),
            "flats" | "flat" => Ok(NotationScheme::Flats),
            other => Err(format!("unknown notation scheme '{}'", other)),
        }
    }
}

/// Name a MIDI note with its octave, where middle C (60) is `C4`.
///
/// # Examples
/// ```
/// use tonnetz::{note_name, NotationScheme};
///
/// assert_eq!(note_name(60, NotationScheme::Sharps), "C4");
/// assert_eq!(note_name(61, NotationScheme::Sharps), "C#4");
/// assert_eq!(note_name(61, NotationScheme::Flats), "Db4");
/// assert_eq!(note_name(21, NotationScheme::Flats), "A0");
/// ```
pub fn note_name(midi_number: u8, scheme: NotationScheme) -> String {
    let names = match scheme {
        NotationScheme::Sharps => &SHARP_NAMES,
        NotationScheme::Flats => &FLAT_NAMES,
    };
    let octave = midi_number as i32 / 12 - 1;
    format!("{}{}", names[(midi_number % 12) as usize], octave)
}
