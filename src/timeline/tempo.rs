//! Tick to seconds conversion
//!
//! Metrical files measure time in ticks per quarter note, and the length of a
//! quarter note changes with every tempo event. The map below stores the
//! elapsed seconds at each tempo change so any tick converts with one lookup.

use super::types::TempoChange;

/// Microseconds per quarter note when a file declares no tempo (120 BPM).
pub(crate) const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Segment {
    tick: u64,
    seconds: f64,
    micros_per_quarter: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TickClock {
    Metrical {
        ticks_per_quarter: u16,
        segments: Vec<Segment>,
    },
    /// SMPTE division: every tick is a fixed slice of a frame.
    Timecode { seconds_per_tick: f64 },
}

impl TickClock {
    /// Build a metrical clock from `(tick, micros_per_quarter)` changes.
    ///
    /// `changes` must already be ordered by tick. When several changes share a
    /// tick, the last one wins.
    pub fn metrical(ticks_per_quarter: u16, changes: &[(u64, u32)]) -> Self {
        let mut segments = vec![Segment {
            tick: 0,
            seconds: 0.0,
            micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
        }];

        for &(tick, micros_per_quarter) in changes {
            if micros_per_quarter == 0 {
                continue;
            }
            let last = segments[segments.len() - 1];
            if tick == last.tick {
                let idx = segments.len() - 1;
                segments[idx].micros_per_quarter = micros_per_quarter;
                continue;
            }
            segments.push(Segment {
                tick,
                seconds: last.seconds
                    + span_seconds(tick - last.tick, last.micros_per_quarter, ticks_per_quarter),
                micros_per_quarter,
            });
        }

        TickClock::Metrical {
            ticks_per_quarter,
            segments,
        }
    }

    pub fn timecode(frames_per_second: f64, ticks_per_frame: u8) -> Self {
        TickClock::Timecode {
            seconds_per_tick: 1.0 / (frames_per_second * ticks_per_frame as f64),
        }
    }

    pub fn seconds_at(&self, tick: u64) -> f64 {
        match self {
            TickClock::Metrical {
                ticks_per_quarter,
                segments,
            } => {
                // segments[0].tick is 0, so at least one segment always matches
                let idx = segments.partition_point(|s| s.tick <= tick) - 1;
                let seg = segments[idx];
                seg.seconds + span_seconds(tick - seg.tick, seg.micros_per_quarter, *ticks_per_quarter)
            }
            TickClock::Timecode { seconds_per_tick } => tick as f64 * seconds_per_tick,
        }
    }

    pub fn ticks_per_quarter(&self) -> Option<u16> {
        match self {
            TickClock::Metrical {
                ticks_per_quarter, ..
            } => Some(*ticks_per_quarter),
            TickClock::Timecode { .. } => None,
        }
    }

    /// Tempo in effect at the first tick.
    pub fn initial_bpm(&self) -> f64 {
        match self {
            TickClock::Metrical { segments, .. } => bpm(segments[0].micros_per_quarter),
            TickClock::Timecode { .. } => bpm(DEFAULT_MICROS_PER_QUARTER),
        }
    }

    pub fn tempo_changes(&self) -> Vec<TempoChange> {
        match self {
            TickClock::Metrical { segments, .. } => segments
                .iter()
                .map(|seg| TempoChange {
                    time_seconds: seg.seconds,
                    bpm: bpm(seg.micros_per_quarter),
                })
                .collect(),
            TickClock::Timecode { .. } => vec![TempoChange {
                time_seconds: 0.0,
                bpm: self.initial_bpm(),
            }],
        }
    }
}

fn span_seconds(ticks: u64, micros_per_quarter: u32, ticks_per_quarter: u16) -> f64 {
    ticks as f64 * micros_per_quarter as f64 / 1_000_000.0 / ticks_per_quarter as f64
}

fn bpm(micros_per_quarter: u32) -> f64 {
    60_000_000.0 / micros_per_quarter as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tempo_is_120_bpm() {
        let clock = TickClock::metrical(480, &[]);
        assert_eq!(clock.initial_bpm(), 120.0);
        assert_eq!(clock.seconds_at(480), 0.5);
        assert_eq!(clock.seconds_at(1920), 2.0);
    }

    #[test]
    fn test_tempo_change_stretches_later_ticks() {
        // 120 BPM for one beat, then 90 BPM
        let clock = TickClock::metrical(480, &[(0, 500_000), (480, 666_667)]);

        assert_eq!(clock.seconds_at(480), 0.5);
        let beat_after_change = clock.seconds_at(960) - clock.seconds_at(480);
        assert!((beat_after_change - 0.666667).abs() < 1e-6);

        let changes = clock.tempo_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].time_seconds, 0.5);
        assert!((changes[1].bpm - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_later_change_at_same_tick_wins() {
        let clock = TickClock::metrical(96, &[(0, 400_000), (0, 600_000)]);
        assert_eq!(clock.initial_bpm(), 100.0);
        assert_eq!(clock.tempo_changes().len(), 1);
    }

    #[test]
    fn test_zero_tempo_is_ignored() {
        let clock = TickClock::metrical(96, &[(96, 0)]);
        assert_eq!(clock.tempo_changes().len(), 1);
        assert_eq!(clock.seconds_at(96), 0.5);
    }

    #[test]
    fn test_timecode_ticks_are_fixed_length() {
        // 25 fps, 40 ticks per frame = 1000 ticks per second
        let clock = TickClock::timecode(25.0, 40);
        assert_eq!(clock.ticks_per_quarter(), None);
        assert!((clock.seconds_at(1500) - 1.5).abs() < 1e-12);
    }
}
