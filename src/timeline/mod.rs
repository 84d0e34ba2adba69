//! # Timeline Module
//!
//! Turn a Standard MIDI File into an immutable, tempo-corrected timeline of notes
//! and chords for the playback engine.
//!
//! ## Purpose
//! Playback and dispatch only ever deal in seconds. This module does all of the
//! tick arithmetic once, at load time, so the transport can walk a flat list of
//! boundaries without knowing anything about the file format.
//!
//! ## Sub-modules
//! - `types` - NoteEvent, ChordEvent, Timeline, Boundary type definitions
//! - `parser` - Header validation, track decoding, note matching
//! - `tempo` - Tick to seconds conversion through the tempo map
//! - `chords` - Anchor-based grouping of coincident onsets
//!
//! ## Key Types
//! - [`Timeline`] - Complete parsed performance (notes + chords + tempo map)
//! - [`NoteEvent`] - Single note with absolute start and end times
//! - [`ChordEvent`] - Two or more notes starting together
//!
//! ## Entry Point
//! [`parse()`] - Convert SMF bytes into a [`Timeline`]
//!
//! ## Ordering
//!
//! Notes are ordered by start time, then track index, then MIDI number. The
//! dispatch loop fires from two boundary lists derived from that order:
//!
//! - note boundaries: every note's start and end
//! - chord boundaries: every chord's start (its anchor's onset) and end (its
//!   latest constituent release)
//!
//! At equal times, ends precede starts so a re-struck pitch releases before it
//! sounds again. A zero-length note's end still follows its own start.

mod chords;
mod parser;
mod tempo;
mod types;


pub use chords::{aggregate, DEFAULT_EPSILON_MS};
pub use parser::{parse, parse_with};
pub use types::{
    Boundary, BoundaryKind, ChordEvent, NoteEvent, TempoChange, Timeline, TimelineMetadata,
};
