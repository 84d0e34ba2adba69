//! # Dispatch Loop
//!
//! Walks a [`Timeline`]'s boundary lists and fires the matching callbacks for
//! every boundary the transport has moved past.
//!
//! ## Cursors
//! Two indices, one into the note boundaries and one into the chord
//! boundaries. Each only moves forward during playback, so every boundary
//! fires at most once per pass. Within one call all note callbacks fire before
//! any chord callback.
//!
//! ## Seeking
//! - Forward: nothing is skipped; the next call fires every boundary up to the
//!   new position
//! - Backward: [`DispatchCursor::reset_to`] rewinds both indices to the first
//!   boundary at or after the new position
//! - Stop: [`DispatchCursor::reset`] rewinds to the beginning

use tracing::trace;

use crate::callbacks::{ChordEnd, ChordNote, ChordStart, HandlerSet, NoteEnd, NoteStart};
use crate::notation::{note_name, NotationScheme};
use crate::timeline::{Boundary, BoundaryKind, Timeline};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCursor {
    note: usize,
    chord: usize,
}

impl DispatchCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next note boundary to fire.
    pub fn note_index(&self) -> usize {
        self.note
    }

    /// Index of the next chord boundary to fire.
    pub fn chord_index(&self) -> usize {
        self.chord
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn reset_to(&mut self, timeline: &Timeline, position: f64) {
        self.note = first_at_or_after(timeline.note_boundaries(), position);
        self.chord = first_at_or_after(timeline.chord_boundaries(), position);
        trace!(position, note = self.note, chord = self.chord, "cursor rewound");
    }

    /// Fire every boundary with `time <= position` not yet fired.
    ///
    /// Returns how many callbacks were due. Calling again with the same
    /// position fires nothing.
    pub fn advance(
        &mut self,
        timeline: &Timeline,
        position: f64,
        handlers: &HandlerSet,
        scheme: NotationScheme,
    ) -> usize {
        let mut fired = 0;

        let notes = timeline.note_boundaries();
        while let Some(boundary) = notes.get(self.note).filter(|b| b.time <= position) {
            self.note += 1;
            fired += 1;
            let note = &timeline.events[boundary.index];
            let name = note_name(note.midi_number, scheme);
            match boundary.kind {
                BoundaryKind::Start => handlers.note_start(&NoteStart {
                    name,
                    midi_number: note.midi_number,
                    velocity: note.velocity,
                    track_index: note.track_index,
                    time: boundary.time,
                }),
                BoundaryKind::End => handlers.note_end(&NoteEnd {
                    name,
                    midi_number: note.midi_number,
                    track_index: note.track_index,
                    time: boundary.time,
                }),
            }
        }

        let chords = timeline.chord_boundaries();
        while let Some(boundary) = chords.get(self.chord).filter(|b| b.time <= position) {
            self.chord += 1;
            fired += 1;
            match boundary.kind {
                BoundaryKind::Start => {
                    let chord = &timeline.chords[boundary.index];
                    handlers.chord_start(&ChordStart {
                        notes: chord
                            .notes
                            .iter()
                            .map(|note| ChordNote {
                                midi_number: note.midi_number,
                            })
                            .collect(),
                        time: boundary.time,
                    });
                }
                BoundaryKind::End => handlers.chord_end(&ChordEnd {
                    time: boundary.time,
                }),
            }
        }

        if fired > 0 {
            trace!(position, fired, "dispatched");
        }
        fired
    }
}

fn first_at_or_after(boundaries: &[Boundary], position: f64) -> usize {
    boundaries.partition_point(|b| b.time < position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{DispatchedEvent, EventQueue};
    use crate::timeline::NoteEvent;

    fn note(midi: u8, start: f64, end: f64) -> NoteEvent {
        NoteEvent {
            note_name: String::new(),
            midi_number: midi,
            velocity: 0.5,
            start_time: start,
            end_time: end,
            track_index: 0,
            channel: 0,
        }
    }

    /// C major triad at 1.0s, a lone G at 2.0s.
    fn sample() -> Timeline {
        Timeline::from_notes(
            vec![
                note(60, 1.0, 1.5),
                note(64, 1.01, 1.5),
                note(67, 1.02, 1.6),
                note(67, 2.0, 2.5),
            ],
            0.030,
        )
    }

    fn kinds(events: &[DispatchedEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                DispatchedEvent::NoteStart(n) => format!("+{}@{}", n.midi_number, n.time),
                DispatchedEvent::NoteEnd(n) => format!("-{}@{}", n.midi_number, n.time),
                DispatchedEvent::ChordStart(c) => format!("+chord{}@{}", c.notes.len(), c.time),
                DispatchedEvent::ChordEnd(c) => format!("-chord@{}", c.time),
            })
            .collect()
    }

    #[test]
    fn test_fires_nothing_before_first_note() {
        let timeline = sample();
        let queue = EventQueue::new();
        let mut cursor = DispatchCursor::new();
        assert_eq!(cursor.advance(&timeline, 0.5, &queue.handlers(), NotationScheme::Sharps), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_same_position_twice_fires_once() {
        let timeline = sample();
        let queue = EventQueue::new();
        let handlers = queue.handlers();
        let mut cursor = DispatchCursor::new();

        cursor.advance(&timeline, 1.2, &handlers, NotationScheme::Sharps);
        let first = queue.drain();
        assert_eq!(cursor.advance(&timeline, 1.2, &handlers, NotationScheme::Sharps), 0);
        assert!(queue.is_empty());
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_note_callbacks_precede_chord_callbacks() {
        let timeline = sample();
        let queue = EventQueue::new();
        let mut cursor = DispatchCursor::new();
        cursor.advance(&timeline, 1.05, &queue.handlers(), NotationScheme::Sharps);

        assert_eq!(
            kinds(&queue.drain()),
            vec!["+60@1", "+64@1.01", "+67@1.02", "+chord3@1"]
        );
    }

    #[test]
    fn test_full_pass_fires_each_boundary_once_in_time_order() {
        let timeline = sample();
        let queue = EventQueue::new();
        let handlers = queue.handlers();
        let mut cursor = DispatchCursor::new();

        let mut position = 0.0;
        while position < 3.0 {
            position += 0.016;
            cursor.advance(&timeline, position, &handlers, NotationScheme::Sharps);
        }

        let events = queue.drain();
        let starts = events
            .iter()
            .filter(|e| matches!(e, DispatchedEvent::NoteStart(_)))
            .count();
        let ends = events
            .iter()
            .filter(|e| matches!(e, DispatchedEvent::NoteEnd(_)))
            .count();
        assert_eq!(starts, timeline.events.len());
        assert_eq!(ends, timeline.events.len());

        let note_times: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                DispatchedEvent::NoteStart(n) => Some(n.time),
                DispatchedEvent::NoteEnd(n) => Some(n.time),
                _ => None,
            })
            .collect();
        assert!(note_times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_rewind_replays_like_a_fresh_pass() {
        let timeline = sample();
        let handlers_queue = EventQueue::new();
        let handlers = handlers_queue.handlers();

        // Fresh pass, paused at 1.25 and resumed to the end
        let mut fresh = DispatchCursor::new();
        fresh.advance(&timeline, 1.25, &handlers, NotationScheme::Sharps);
        handlers_queue.drain();
        fresh.advance(&timeline, 3.0, &handlers, NotationScheme::Sharps);
        let expected = handlers_queue.drain();

        // Played past the end, then rewound to 1.25
        let mut rewound = DispatchCursor::new();
        rewound.advance(&timeline, 3.0, &handlers, NotationScheme::Sharps);
        handlers_queue.drain();
        rewound.reset_to(&timeline, 1.25);
        rewound.advance(&timeline, 3.0, &handlers, NotationScheme::Sharps);

        assert_eq!(handlers_queue.drain(), expected);
    }

    #[test]
    fn test_rewind_refires_boundaries_exactly_at_target() {
        let timeline = sample();
        let mut cursor = DispatchCursor::new();
        cursor.advance(&timeline, 3.0, &HandlerSet::new(), NotationScheme::Sharps);
        cursor.reset_to(&timeline, 2.0);

        let queue = EventQueue::new();
        cursor.advance(&timeline, 2.0, &queue.handlers(), NotationScheme::Sharps);
        assert_eq!(kinds(&queue.drain()), vec!["+67@2"]);
    }

    #[test]
    fn test_reset_starts_over() {
        let timeline = sample();
        let mut cursor = DispatchCursor::new();
        cursor.advance(&timeline, 3.0, &HandlerSet::new(), NotationScheme::Sharps);
        assert_eq!(cursor.note_index(), timeline.note_boundaries().len());
        assert_eq!(cursor.chord_index(), timeline.chord_boundaries().len());
        cursor.reset();
        assert_eq!(cursor, DispatchCursor::new());
    }

    #[test]
    fn test_failing_handler_does_not_stop_dispatch() {
        let timeline = sample();
        let queue = EventQueue::new();
        let recorder = queue.clone();
        let handlers = HandlerSet::new()
            .on_note_start(|_| Err("display detached".into()))
            .on_note_end(move |e| {
                recorder.handlers().note_end(e);
                Ok(())
            });

        let mut cursor = DispatchCursor::new();
        let fired = cursor.advance(&timeline, 3.0, &handlers, NotationScheme::Sharps);
        assert_eq!(fired, 10);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_panicking_note_start_leaves_other_callbacks_firing() {
        let timeline = sample();
        let queue = EventQueue::new();
        let (ends, chord_starts, chord_ends) = (queue.clone(), queue.clone(), queue.clone());
        let handlers = HandlerSet::new()
            .on_note_start(|_| panic!("canvas gone"))
            .on_note_end(move |e| {
                ends.handlers().note_end(e);
                Ok(())
            })
            .on_chord_start(move |c| {
                chord_starts.handlers().chord_start(c);
                Ok(())
            })
            .on_chord_end(move |c| {
                chord_ends.handlers().chord_end(c);
                Ok(())
            });

        let mut cursor = DispatchCursor::new();
        let fired = cursor.advance(&timeline, 3.0, &handlers, NotationScheme::Sharps);
        assert_eq!(fired, 10);

        let events = queue.drain();
        let count = |f: fn(&DispatchedEvent) -> bool| events.iter().filter(|e| f(e)).count();
        assert_eq!(count(|e| matches!(e, DispatchedEvent::NoteStart(_))), 0);
        assert_eq!(count(|e| matches!(e, DispatchedEvent::NoteEnd(_))), 4);
        assert_eq!(count(|e| matches!(e, DispatchedEvent::ChordStart(_))), 1);
        assert_eq!(count(|e| matches!(e, DispatchedEvent::ChordEnd(_))), 1);
    }

    #[test]
    fn test_names_follow_notation_scheme() {
        let timeline = Timeline::from_notes(vec![note(61, 0.0, 1.0)], 0.030);
        let queue = EventQueue::new();
        let mut cursor = DispatchCursor::new();
        cursor.advance(&timeline, 0.0, &queue.handlers(), NotationScheme::Flats);

        match &queue.drain()[0] {
            DispatchedEvent::NoteStart(n) => assert_eq!(n.name, "Db4"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
