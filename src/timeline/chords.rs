//! Chord grouping
//!
//! Groups notes whose onsets coincide into chords for the chord-start and
//! chord-end callbacks.

use super::types::{ChordEvent, NoteEvent};

/// Coincidence window used when no configuration overrides it.
pub const DEFAULT_EPSILON_MS: f64 = 30.0;

/// Group notes with coincident onsets into chords.
///
/// `events` must be sorted by ascending start time. The first note of a cluster
/// is its anchor; later notes join while their start is within
/// `epsilon_seconds` of the anchor's start. The anchor never moves, so a long
/// run of slightly staggered onsets splits into several chords instead of
/// drifting into one. Clusters with a single note are solos and produce no
/// chord.
///
/// # Example
/// ```
/// use tonnetz::{aggregate, NoteEvent};
///
/// let note = |midi: u8, start: f64| NoteEvent {
///     note_name: String::new(),
///     midi_number: midi,
///     velocity: 1.0,
///     start_time: start,
///     end_time: start + 0.5,
///     track_index: 0,
///     channel: 0,
/// };
///
/// let chords = aggregate(&[note(60, 1.000), note(64, 1.010), note(67, 1.500)], 0.030);
/// assert_eq!(chords.len(), 1);
/// assert_eq!(chords[0].note_indices, vec![0, 1]);
/// ```
pub fn aggregate(events: &[NoteEvent], epsilon_seconds: f64) -> Vec<ChordEvent> {
    let mut chords = Vec::new();
    let mut cluster: Vec<usize> = Vec::new();

    for (index, note) in events.iter().enumerate() {
        if let Some(&anchor) = cluster.first() {
            if note.start_time - events[anchor].start_time > epsilon_seconds {
                close_cluster(events, &mut cluster, &mut chords);
            }
        }
        cluster.push(index);
    }
    close_cluster(events, &mut cluster, &mut chords);

    chords
}

fn close_cluster(events: &[NoteEvent], cluster: &mut Vec<usize>, chords: &mut Vec<ChordEvent>) {
    if cluster.len() >= 2 {
        let notes: Vec<NoteEvent> = cluster.iter().map(|&i| events[i].clone()).collect();
        let start_time = notes
            .iter()
            .map(|n| n.start_time)
            .fold(f64::INFINITY, f64::min);
        let end_time = notes
            .iter()
            .map(|n| n.end_time)
            .fold(f64::NEG_INFINITY, f64::max);
        chords.push(ChordEvent {
            notes,
            note_indices: cluster.clone(),
            start_time,
            end_time,
        });
    }
    cluster.clear();
}
