//! # Error Types
//!
//! This module defines all error types for the tonnetz playback engine.
//!
//! None of these errors are fatal to the process. A failed load leaves the
//! previously loaded timeline in place, and handler failures are logged and
//! swallowed by the dispatch loop.
//!
//! ## Error Types
//! - `ParseError` - The byte buffer is not a playable Standard MIDI File
//! - `LoadError` - A load attempt failed before or during parsing
//! - `ConfigError` - The engine configuration could not be read or is invalid
//! - `PreferenceError` - A preference store could not be read or written
//! - `HandlerError` - Returned by consumer callbacks, never propagated
//!
//! ## Usage
//! ```rust
//! use tonnetz::{parse, ParseError, ParseErrorKind};
//!
//! match parse(b"RIFF....") {
//!     Ok(timeline) => println!("{} notes", timeline.events.len()),
//!     Err(e) => assert_eq!(e.kind(), ParseErrorKind::TruncatedData),
//! }
//! ```

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Broad category of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParseErrorKind {
    MalformedHeader,
    UnsupportedFormat,
    TruncatedData,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The header chunk or the declared track count is inconsistent.
    ///
    /// # Example
    /// ```
    /// # use tonnetz::ParseError;
    /// let err = ParseError::MalformedHeader("expected MThd signature".to_string());
    /// assert_eq!(err.to_string(), "Malformed header: expected MThd signature");
    /// ```
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// The file is well formed but uses a layout the engine does not play.
    ///
    /// Format 2 (independent sequential patterns) is the only such layout today.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The data ends early or a track's event stream cannot be decoded.
    #[error("Truncated data: {0}")]
    TruncatedData(String),
}

impl ParseError {
    pub fn kind(&self) -> ParseErrorKind {
        match self {
            ParseError::MalformedHeader(_) => ParseErrorKind::MalformedHeader,
            ParseError::UnsupportedFormat(_) => ParseErrorKind::UnsupportedFormat,
            ParseError::TruncatedData(_) => ParseErrorKind::TruncatedData,
        }
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    /// Rejected on name or MIME type before any parsing was attempted.
    #[error("Unsupported file '{name}': {reason}")]
    UnsupportedFile { name: String, reason: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A newer load request replaced this one before it finished.
    #[error("Load {generation} was superseded by a newer request")]
    Superseded { generation: u64 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value parsed but is outside its allowed range.
    ///
    /// # Example
    /// ```
    /// # use tonnetz::ConfigError;
    /// let err = ConfigError::Invalid("playback-rate must be positive".to_string());
    /// assert_eq!(err.to_string(), "Invalid config: playback-rate must be positive");
    /// ```
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum PreferenceError {
    #[error("Failed to access preferences at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid preferences file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Error type returned by consumer callbacks.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
