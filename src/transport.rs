//! # Transport Clock
//!
//! Owns the playback position and the play/pause/stop state. Position advances
//! only on [`TransportClock::tick`], by the wall-clock time elapsed since the
//! previous tick multiplied by the playback rate.
//!
//! ## States
//! - `Stopped` - initial and terminal; position 0 unless cued with `seek`
//! - `Playing` - ticks advance the position
//! - `Paused` - position frozen
//!
//! Wall-clock values are plain seconds from any monotonic source the host
//! has (`performance.now() / 1000` in the browser, an `Instant` in the CLI).

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// Read-only view of the transport for hosts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportState {
    pub is_playing: bool,
    pub position_seconds: f64,
    pub last_tick_wall_clock: Option<f64>,
}

/// The span of timeline one tick moved across.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Advance {
    pub from: f64,
    pub to: f64,
    /// The end of the timeline was reached and the transport stopped itself
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportClock {
    state: PlayState,
    position: f64,
    duration: f64,
    rate: f64,
    last_tick: Option<f64>,
}

impl TransportClock {
    pub fn new(duration: f64) -> Self {
        Self {
            state: PlayState::Stopped,
            position: 0.0,
            duration: duration.max(0.0),
            rate: 1.0,
            last_tick: None,
        }
    }

    pub fn with_rate(duration: f64, rate: f64) -> Self {
        let mut clock = Self::new(duration);
        clock.set_playback_rate(rate);
        clock
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn playback_rate(&self) -> f64 {
        self.rate
    }

    /// Change the speed multiplier. Rates that are not finite and positive are ignored.
    pub fn set_playback_rate(&mut self, rate: f64) -> bool {
        if !rate.is_finite() || rate <= 0.0 {
            debug!(rate, "ignoring invalid playback rate");
            return false;
        }
        self.rate = rate;
        true
    }

    pub fn snapshot(&self) -> TransportState {
        TransportState {
            is_playing: self.is_playing(),
            position_seconds: self.position,
            last_tick_wall_clock: self.last_tick,
        }
    }

    /// Begin or resume playback from the current position.
    ///
    /// Returns `false` when already playing.
    pub fn start(&mut self, now: f64) -> bool {
        if self.state == PlayState::Playing {
            return false;
        }
        debug!(from = ?self.state, position = self.position, "transport start");
        self.state = PlayState::Playing;
        self.last_tick = Some(now);
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != PlayState::Playing {
            return false;
        }
        debug!(position = self.position, "transport pause");
        self.state = PlayState::Paused;
        self.last_tick = None;
        true
    }

    pub fn stop(&mut self) {
        debug!(from = ?self.state, "transport stop");
        self.state = PlayState::Stopped;
        self.position = 0.0;
        self.last_tick = None;
    }

    /// Move to `target`, clamped to the timeline. Play state is unchanged.
    ///
    /// Returns `true` when the position moved backwards. Non-finite targets
    /// are ignored.
    pub fn seek(&mut self, target: f64) -> bool {
        if !target.is_finite() {
            debug!(target, "ignoring non-finite seek target");
            return false;
        }
        let clamped = target.clamp(0.0, self.duration);
        let backward = clamped < self.position;
        self.position = clamped;
        backward
    }

    /// Advance by the wall-clock time elapsed since the previous tick.
    ///
    /// Returns `None` unless playing. A clock that runs backwards advances
    /// nothing. Reaching the end stops the transport and rewinds it to 0.
    pub fn tick(&mut self, now: f64) -> Option<Advance> {
        if self.state != PlayState::Playing {
            return None;
        }

        let last = self.last_tick.unwrap_or(now);
        let elapsed = (now - last).max(0.0);
        self.last_tick = Some(now.max(last));

        let from = self.position;
        let to = (from + elapsed * self.rate).min(self.duration);
        let finished = to >= self.duration;

        if finished {
            debug!(duration = self.duration, "transport reached end");
            self.state = PlayState::Stopped;
            self.position = 0.0;
            self.last_tick = None;
        } else {
            self.position = to;
        }

        Some(Advance { from, to, finished })
    }
}
