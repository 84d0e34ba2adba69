//! Timeline type definitions
//!
//! This module defines the immutable data a loaded performance is turned into:
//! notes, chords, tempo changes, and the boundary lists the dispatch loop walks.

use serde::Serialize;

use super::chords::aggregate;

/// A single sounding note with absolute, tempo-corrected times.
///
/// # Fields
/// - `note_name`: Canonical sharp spelling with octave, e.g. `"C#4"` for MIDI 61
/// - `midi_number`: MIDI key number (0-127)
/// - `velocity`: Note-on velocity scaled to 0.0-1.0
/// - `start_time`: Onset in seconds from the start of the file
/// - `end_time`: Release in seconds; equal to `start_time` for zero-length notes
/// - `track_index`: Index of the track chunk the note came from
/// - `channel`: MIDI channel (0-15) the note was played on
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    pub note_name: String,
    pub midi_number: u8,
    pub velocity: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub track_index: usize,
    pub channel: u8,
}

/// Two or more notes whose onsets fall within the coincidence window of the
/// first (anchor) note.
///
/// `note_indices` point into [`Timeline::events`] and are in ascending order.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChordEvent {
    pub notes: Vec<NoteEvent>,
    pub note_indices: Vec<usize>,
    pub start_time: f64,
    pub end_time: f64,
}

/// Tempo in effect from `time_seconds` onwards.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TempoChange {
    pub time_seconds: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    Start,
    End,
}

/// The start or end of one note (or chord) on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Boundary {
    pub time: f64,
    pub kind: BoundaryKind,
    /// Index into `Timeline::events` or `Timeline::chords`
    pub index: usize,
}

/// Header-level facts about a timeline, independent of its notes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TimelineHeader {
    pub tempo_bpm: f64,
    pub time_signature: (u8, u8),
    pub track_count: usize,
    pub tempo_changes: Vec<TempoChange>,
    pub ticks_per_quarter: Option<u16>,
}

impl Default for TimelineHeader {
    fn default() -> Self {
        Self {
            tempo_bpm: 120.0,
            time_signature: (4, 4),
            track_count: 0,
            tempo_changes: vec![TempoChange {
                time_seconds: 0.0,
                bpm: 120.0,
            }],
            ticks_per_quarter: None,
        }
    }
}

/// A fully parsed performance, ready for playback.
///
/// Created once per loaded file and never mutated afterwards. Events are
/// ordered by start time, then track index, then MIDI number.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub events: Vec<NoteEvent>,
    pub chords: Vec<ChordEvent>,
    pub tempo_bpm: f64,
    pub time_signature: (u8, u8),
    pub duration_seconds: f64,
    pub track_count: usize,
    pub tempo_changes: Vec<TempoChange>,
    /// `None` for files using SMPTE timecode division
    pub ticks_per_quarter: Option<u16>,
    #[serde(skip)]
    note_boundaries: Vec<Boundary>,
    #[serde(skip)]
    chord_boundaries: Vec<Boundary>,
}

/// Read-only summary handed to the host UI.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMetadata {
    pub tempo_bpm: f64,
    pub time_signature: (u8, u8),
    pub track_count: usize,
    pub duration_seconds: f64,
    pub note_count: usize,
    pub chord_count: usize,
    pub tempo_changes: Vec<TempoChange>,
}

impl Timeline {
    /// Build a timeline from already-timed notes.
    ///
    /// Notes are sorted into timeline order and grouped into chords using
    /// `epsilon_seconds` as the coincidence window. Tempo and time signature
    /// take their defaults (120 BPM, 4/4).
    ///
    /// # Example
    /// ```rust
    /// use tonnetz::{NoteEvent, Timeline};
    ///
    /// let note = |midi: u8, start: f64| NoteEvent {
    ///     note_name: String::new(),
    ///     midi_number: midi,
    ///     velocity: 0.8,
    ///     start_time: start,
    ///     end_time: start + 0.25,
    ///     track_index: 0,
    ///     channel: 0,
    /// };
    ///
    /// let timeline = Timeline::from_notes(vec![note(64, 1.010), note(60, 1.0), note(67, 1.5)], 0.030);
    /// assert_eq!(timeline.chords.len(), 1);
    /// assert_eq!(timeline.chords[0].start_time, 1.0);
    /// assert_eq!(timeline.duration_seconds, 1.75);
    /// ```
    pub fn from_notes(events: Vec<NoteEvent>, epsilon_seconds: f64) -> Self {
        let track_count = events
            .iter()
            .map(|note| note.track_index + 1)
            .max()
            .unwrap_or(0);
        let header = TimelineHeader {
            track_count,
            ..TimelineHeader::default()
        };
        Self::assemble(events, epsilon_seconds, header)
    }

    pub(crate) fn assemble(
        mut events: Vec<NoteEvent>,
        epsilon_seconds: f64,
        header: TimelineHeader,
    ) -> Self {
        events.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then(a.track_index.cmp(&b.track_index))
                .then(a.midi_number.cmp(&b.midi_number))
        });

        let chords = aggregate(&events, epsilon_seconds);
        let duration_seconds = events
            .iter()
            .map(|note| note.end_time)
            .fold(0.0_f64, f64::max);

        let note_boundaries =
            boundaries(events.iter().map(|note| (note.start_time, note.end_time)));
        let chord_boundaries =
            boundaries(chords.iter().map(|chord| (chord.start_time, chord.end_time)));

        Self {
            events,
            chords,
            tempo_bpm: header.tempo_bpm,
            time_signature: header.time_signature,
            duration_seconds,
            track_count: header.track_count,
            tempo_changes: header.tempo_changes,
            ticks_per_quarter: header.ticks_per_quarter,
            note_boundaries,
            chord_boundaries,
        }
    }

    /// Note starts and ends in firing order.
    pub fn note_boundaries(&self) -> &[Boundary] {
        &self.note_boundaries
    }

    /// Chord starts and ends in firing order.
    pub fn chord_boundaries(&self) -> &[Boundary] {
        &self.chord_boundaries
    }

    pub fn metadata(&self) -> TimelineMetadata {
        TimelineMetadata {
            tempo_bpm: self.tempo_bpm,
            time_signature: self.time_signature,
            track_count: self.track_count,
            duration_seconds: self.duration_seconds,
            note_count: self.events.len(),
            chord_count: self.chords.len(),
            tempo_changes: self.tempo_changes.clone(),
        }
    }
}

/// Flatten `(start, end)` spans into boundaries sorted by firing order.
///
/// At equal times an end fires before a start so a re-struck pitch releases
/// before it sounds again. The end of a zero-length span is the exception: it
/// always follows its own start.
fn boundaries(spans: impl Iterator<Item = (f64, f64)>) -> Vec<Boundary> {
    let mut ranked = Vec::new();
    for (index, (start, end)) in spans.enumerate() {
        let end_rank = if end > start { 0 } else { 2 };
        ranked.push((
            1,
            Boundary {
                time: start,
                kind: BoundaryKind::Start,
                index,
            },
        ));
        ranked.push((
            end_rank,
            Boundary {
                time: end,
                kind: BoundaryKind::End,
                index,
            },
        ));
    }

    ranked.sort_by(|(rank_a, a), (rank_b, b)| {
        a.time
            .total_cmp(&b.time)
            .then(rank_a.cmp(rank_b))
            .then(a.index.cmp(&b.index))
    });
    ranked.into_iter().map(|(_, boundary)| boundary).collect()
}
