//! Standard MIDI File parsing
//!
//! Converts the raw bytes of a Standard MIDI File into a [`Timeline`] with
//! absolute, tempo-corrected note times.
//!
//! The header chunk and chunk framing are validated here so every failure maps
//! onto the [`ParseError`] taxonomy. Track event streams are decoded by `midly`.

use std::collections::{BTreeMap, VecDeque};

use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
use tracing::debug;

use super::tempo::TickClock;
use super::types::{NoteEvent, Timeline, TimelineHeader};
use crate::config::EngineConfig;
use crate::error::ParseError;
use crate::notation::{note_name, NotationScheme};

const HEADER_ID: &[u8; 4] = b"MThd";
const TRACK_ID: &[u8; 4] = b"MTrk";
const MIN_FILE_LEN: usize = 14;

/// Fields of the `MThd` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    track_count: u16,
    division: u16,
    /// Offset of the first chunk after the header
    body_start: usize,
}

/// Parse a Standard MIDI File with the default engine configuration.
///
/// # Example
/// ```rust
/// use tonnetz::{parse, ParseErrorKind};
///
/// let err = parse(b"not a midi file at all").unwrap_err();
/// assert_eq!(err.kind(), ParseErrorKind::MalformedHeader);
/// ```
pub fn parse(bytes: &[u8]) -> Result<Timeline, ParseError> {
    parse_with(bytes, &EngineConfig::default())
}

/// Parse a Standard MIDI File, grouping chords with `config.epsilon_ms`.
///
/// # Timing
/// Metrical files are converted through a global tempo map: tempo events from
/// every track apply to all tracks from their tick onwards. SMPTE files use a
/// fixed tick length and ignore tempo events.
///
/// # Notes
/// - Note-on with velocity 0 is a note-off
/// - A note-off closes the oldest open note of the same track, channel and pitch
/// - Note-offs with nothing to close are ignored
/// - Notes still open when the file ends are closed at the file's final time
///
/// # Errors
/// Returns [`ParseError`] when the header, the declared track count or a track's
/// event stream is inconsistent.
pub fn parse_with(bytes: &[u8], config: &EngineConfig) -> Result<Timeline, ParseError> {
    let header = read_header(bytes)?;
    let used = check_chunks(bytes, &header)?;

    let clock = clock_for(header.division)?;
    // midly is built with `strict`: a malformed event fails the parse instead of ending its track
    let smf = Smf::parse(&bytes[..used]).map_err(|e| ParseError::TruncatedData(e.to_string()))?;

    let mut tempo_events: Vec<(u64, u32)> = Vec::new();
    let mut time_signature: Option<(u64, (u8, u8))> = None;
    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(micros)) => {
                    tempo_events.push((tick, micros.as_int()));
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denominator_pow, _, _)) => {
                    if denominator_pow > 7 {
                        debug!(denominator_pow, "ignoring time signature with oversized denominator");
                        continue;
                    }
                    let earlier = time_signature.map_or(true, |(seen, _)| tick < seen);
                    if earlier {
                        time_signature = Some((tick, (numerator, 1u8 << denominator_pow)));
                    }
                }
                _ => {}
            }
        }
    }
    // Stable sort keeps track order for changes sharing a tick
    tempo_events.sort_by_key(|&(tick, _)| tick);

    let clock = match clock {
        ClockKind::Metrical(ticks_per_quarter) => TickClock::metrical(ticks_per_quarter, &tempo_events),
        ClockKind::Timecode(fps, ticks_per_frame) => TickClock::timecode(fps, ticks_per_frame),
    };

    let mut events = Vec::new();
    let mut unclosed: Vec<(usize, u8, u8, u64, u8)> = Vec::new();
    let mut file_end_tick: u64 = 0;

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut open: BTreeMap<(u8, u8), VecDeque<(u64, u8)>> = BTreeMap::new();
        let mut tick: u64 = 0;

        for event in track {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open.entry((channel, key.as_int()))
                        .or_default()
                        .push_back((tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let pitch = key.as_int();
                    match open.get_mut(&(channel, pitch)).and_then(VecDeque::pop_front) {
                        Some((start_tick, velocity)) => events.push(note_event(
                            &clock,
                            track_index,
                            channel,
                            pitch,
                            velocity,
                            start_tick,
                            clock.seconds_at(tick),
                        )),
                        None => debug!(track_index, channel, pitch, tick, "ignoring unmatched note-off"),
                    }
                }
                _ => {}
            }
        }

        file_end_tick = file_end_tick.max(tick);
        for ((channel, pitch), pending) in open {
            for (start_tick, velocity) in pending {
                unclosed.push((track_index, channel, pitch, start_tick, velocity));
            }
        }
    }

    let file_end = clock.seconds_at(file_end_tick);
    for (track_index, channel, pitch, start_tick, velocity) in unclosed {
        debug!(track_index, channel, pitch, "closing note left open at end of file");
        events.push(note_event(&clock, track_index, channel, pitch, velocity, start_tick, file_end));
    }

    let header = TimelineHeader {
        tempo_bpm: clock.initial_bpm(),
        time_signature: time_signature.map_or((4, 4), |(_, sig)| sig),
        track_count: header.track_count as usize,
        tempo_changes: clock.tempo_changes(),
        ticks_per_quarter: clock.ticks_per_quarter(),
    };
    let timeline = Timeline::assemble(events, config.epsilon_seconds(), header);

    debug!(
        notes = timeline.events.len(),
        chords = timeline.chords.len(),
        tracks = timeline.track_count,
        duration = timeline.duration_seconds,
        "parsed timeline"
    );
    Ok(timeline)
}

fn note_event(
    clock: &TickClock,
    track_index: usize,
    channel: u8,
    pitch: u8,
    velocity: u8,
    start_tick: u64,
    end_time: f64,
) -> NoteEvent {
    let start_time = clock.seconds_at(start_tick);
    NoteEvent {
        note_name: note_name(pitch, NotationScheme::Sharps),
        midi_number: pitch,
        velocity: velocity as f64 / 127.0,
        start_time,
        end_time: end_time.max(start_time),
        track_index,
        channel,
    }
}

fn read_header(bytes: &[u8]) -> Result<Header, ParseError> {
    if bytes.len() < MIN_FILE_LEN {
        return Err(ParseError::TruncatedData(format!(
            "{} bytes is too short for a header chunk",
            bytes.len()
        )));
    }
    if &bytes[0..4] != HEADER_ID {
        return Err(ParseError::MalformedHeader(
            "expected MThd signature".to_string(),
        ));
    }

    let length = read_u32(bytes, 4) as usize;
    if length < 6 {
        return Err(ParseError::MalformedHeader(format!(
            "header length {} is shorter than 6 bytes",
            length
        )));
    }
    let body_start = 8usize.checked_add(length).filter(|&end| end <= bytes.len()).ok_or_else(|| {
        ParseError::TruncatedData(format!("header declares {} bytes past end of data", length))
    })?;

    let format = read_u16(bytes, 8);
    let track_count = read_u16(bytes, 10);
    let division = read_u16(bytes, 12);

    match format {
        0 if track_count != 1 => {
            return Err(ParseError::MalformedHeader(format!(
                "format 0 declares {} tracks",
                track_count
            )))
        }
        0 | 1 => {}
        2 => {
            return Err(ParseError::UnsupportedFormat(
                "format 2 (sequential tracks) is not supported".to_string(),
            ))
        }
        other => {
            return Err(ParseError::UnsupportedFormat(format!(
                "unknown format {}",
                other
            )))
        }
    }
    if track_count == 0 {
        return Err(ParseError::MalformedHeader("file declares no tracks".to_string()));
    }

    Ok(Header {
        track_count,
        division,
        body_start,
    })
}

/// Walk chunk framing and compare the `MTrk` count with the header.
///
/// Returns the length of the data up to the end of the last complete chunk.
fn check_chunks(bytes: &[u8], header: &Header) -> Result<usize, ParseError> {
    let declared = header.track_count as usize;
    let mut offset = header.body_start;
    let mut tracks = 0usize;

    while offset < bytes.len() {
        let chunk_end = if bytes.len() - offset >= 8 {
            offset
                .checked_add(8 + read_u32(bytes, offset + 4) as usize)
                .filter(|&end| end <= bytes.len())
        } else {
            None
        };

        let Some(chunk_end) = chunk_end else {
            if tracks >= declared {
                // Padding after the last track is common in the wild
                debug!(offset, "ignoring trailing bytes after final track");
                break;
            }
            return Err(ParseError::TruncatedData(format!(
                "chunk at byte {} runs past end of data",
                offset
            )));
        };

        if &bytes[offset..offset + 4] == TRACK_ID {
            tracks += 1;
        }
        offset = chunk_end;
    }

    if tracks < declared {
        return Err(ParseError::TruncatedData(format!(
            "header declares {} tracks but only {} were found",
            declared, tracks
        )));
    }
    if tracks > declared {
        return Err(ParseError::MalformedHeader(format!(
            "header declares {} tracks but {} were found",
            declared, tracks
        )));
    }
    Ok(offset)
}

enum ClockKind {
    Metrical(u16),
    Timecode(f64, u8),
}

fn clock_for(division: u16) -> Result<ClockKind, ParseError> {
    if division & 0x8000 == 0 {
        if division == 0 {
            return Err(ParseError::MalformedHeader(
                "division of 0 ticks per quarter note".to_string(),
            ));
        }
        return Ok(ClockKind::Metrical(division));
    }

    let frames = (division >> 8) as u8 as i8;
    let ticks_per_frame = (division & 0xff) as u8;
    let fps = match frames.unsigned_abs() {
        24 => 24.0,
        25 => 25.0,
        29 => 29.97,
        30 => 30.0,
        other => {
            return Err(ParseError::MalformedHeader(format!(
                "invalid SMPTE frame rate {}",
                other
            )))
        }
    };
    if ticks_per_frame == 0 {
        return Err(ParseError::MalformedHeader(
            "SMPTE division with 0 ticks per frame".to_string(),
        ));
    }
    Ok(ClockKind::Timecode(fps, ticks_per_frame))
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
