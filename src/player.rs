//! # Player
//!
//! The single owner of playback state. A host drives it with wall-clock
//! ticks and reacts through the handlers installed in its
//! [`CallbackRegistry`].
//!
//! ## Lifecycle
//! 1. Create with an [`EngineConfig`] (and optionally a preference store for
//!    the notation scheme)
//! 2. Install handlers
//! 3. Load bytes, a file, or a background request
//! 4. `start`, then call `tick` once per frame
//!
//! A failed load never disturbs the timeline already loaded. A successful one
//! replaces it and resets the transport.
//!
//! ## Example
//! ```rust
//! use tonnetz::{EngineConfig, NoteEvent, Player, Timeline};
//!
//! let mut player = Player::new(EngineConfig::default());
//! player.on_ready(|meta| println!("{} notes ready", meta.note_count));
//!
//! let note = NoteEvent {
//!     note_name: "A4".to_string(),
//!     midi_number: 69,
//!     velocity: 0.8,
//!     start_time: 0.0,
//!     end_time: 0.5,
//!     track_index: 0,
//!     channel: 0,
//! };
//! player.load_timeline(Timeline::from_notes(vec![note], 0.030));
//!
//! player.start(10.0);
//! assert_eq!(player.tick(10.25), 1);
//! assert_eq!(player.current_time(), 0.25);
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::callbacks::{CallbackRegistry, HandlerSet};
use crate::config::EngineConfig;
use crate::dispatch::DispatchCursor;
use crate::error::{LoadError, PreferenceError};
use crate::loader::{FileSource, Loader};
use crate::notation::NotationScheme;
use crate::prefs::PreferenceStore;
use crate::timeline::{parse_with, Timeline, TimelineMetadata};
use crate::transport::{PlayState, TransportClock, TransportState};

type ReadyCallback = Box<dyn FnOnce(&TimelineMetadata) + Send>;

struct Session {
    timeline: Arc<Timeline>,
    transport: TransportClock,
    cursor: DispatchCursor,
}

pub struct Player {
    config: EngineConfig,
    notation: NotationScheme,
    registry: CallbackRegistry,
    loader: Loader,
    session: Option<Session>,
    ready: Vec<ReadyCallback>,
}

impl Player {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            notation: NotationScheme::default(),
            registry: CallbackRegistry::new(),
            loader: Loader::new(),
            session: None,
            ready: Vec::new(),
        }
    }

    /// Create a player whose notation scheme is read from `store`.
    pub fn with_preferences(config: EngineConfig, store: &dyn PreferenceStore) -> Self {
        let mut player = Self::new(config);
        player.notation = NotationScheme::load(store);
        debug!(notation = %player.notation, "notation preference loaded");
        player
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn install_handlers(&self, handlers: HandlerSet) {
        self.registry.install(handlers);
    }

    pub fn notation(&self) -> NotationScheme {
        self.notation
    }

    /// Switch note spelling for callbacks fired from now on.
    pub fn set_notation(&mut self, scheme: NotationScheme) {
        self.notation = scheme;
    }

    /// Switch note spelling and persist the choice.
    pub fn save_notation(
        &mut self,
        scheme: NotationScheme,
        store: &mut dyn PreferenceStore,
    ) -> Result<(), PreferenceError> {
        self.notation = scheme;
        scheme.save(store)
    }

    // ---- loading ----

    /// Parse `bytes` on the calling thread and make the result current.
    ///
    /// Any background load in flight is superseded.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<TimelineMetadata, LoadError> {
        self.loader.cancel();
        let result = parse_with(bytes, &self.config).map_err(LoadError::from);
        self.finish_load(result)
    }

    /// Check the file name, read the file, and load it.
    pub fn load_file(&mut self, path: &Path) -> Result<TimelineMetadata, LoadError> {
        let name = path.to_string_lossy();
        FileSource::new(&name, None).check(&self.config)?;
        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_bytes(&bytes)
    }

    /// Make an already-built timeline current.
    pub fn load_timeline(&mut self, timeline: Timeline) -> TimelineMetadata {
        self.loader.cancel();
        self.install(timeline)
    }

    /// Start parsing in the background. Returns the request's generation.
    ///
    /// Native targets only: the parse runs on a spawned thread, which wasm32
    /// cannot start. Browser hosts use [`Player::load_bytes`]. See
    /// [`Loader::begin`] for what superseding does to a running parse.
    pub fn begin_load(&mut self, bytes: Vec<u8>) -> u64 {
        self.loader.begin(bytes, &self.config)
    }

    /// Discard the background request in flight. The current timeline stays.
    pub fn cancel_load(&mut self) -> bool {
        self.loader.cancel()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.pending().is_some()
    }

    /// Apply the background result if it has arrived. Call once per frame.
    pub fn poll_load(&mut self) -> Option<Result<TimelineMetadata, LoadError>> {
        let result = self.loader.poll()?;
        Some(self.finish_load(result))
    }

    /// Block until background request `generation` finishes or `timeout` passes.
    pub fn wait_load(
        &mut self,
        generation: u64,
        timeout: Duration,
    ) -> Option<Result<TimelineMetadata, LoadError>> {
        let result = self.loader.wait(generation, timeout)?;
        Some(self.finish_load(result))
    }

    fn finish_load(
        &mut self,
        result: Result<Timeline, LoadError>,
    ) -> Result<TimelineMetadata, LoadError> {
        match result {
            Ok(timeline) => Ok(self.install(timeline)),
            Err(e) => {
                warn!(error = %e, keeping_current = self.session.is_some(), "load failed");
                Err(e)
            }
        }
    }

    fn install(&mut self, timeline: Timeline) -> TimelineMetadata {
        let metadata = timeline.metadata();
        info!(
            notes = metadata.note_count,
            chords = metadata.chord_count,
            tracks = metadata.track_count,
            duration = metadata.duration_seconds,
            "timeline loaded"
        );

        self.session = Some(Session {
            transport: TransportClock::with_rate(
                timeline.duration_seconds,
                self.config.playback_rate,
            ),
            timeline: Arc::new(timeline),
            cursor: DispatchCursor::new(),
        });

        for callback in self.ready.drain(..) {
            callback(&metadata);
        }
        metadata
    }

    /// Run `callback` once a timeline is available.
    ///
    /// Fires immediately when one is already loaded, otherwise after the next
    /// successful load.
    pub fn on_ready(&mut self, callback: impl FnOnce(&TimelineMetadata) + Send + 'static) {
        match &self.session {
            Some(session) => callback(&session.timeline.metadata()),
            None => self.ready.push(Box::new(callback)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    pub fn timeline(&self) -> Option<Arc<Timeline>> {
        self.session.as_ref().map(|s| s.timeline.clone())
    }

    pub fn metadata(&self) -> Option<TimelineMetadata> {
        self.session.as_ref().map(|s| s.timeline.metadata())
    }

    // ---- transport ----

    /// Begin or resume playback. Ignored until something is loaded.
    pub fn start(&mut self, now: f64) -> bool {
        match self.session.as_mut() {
            Some(session) => session.transport.start(now),
            None => {
                debug!("start ignored, nothing loaded");
                false
            }
        }
    }

    pub fn pause(&mut self) -> bool {
        self.session
            .as_mut()
            .map(|s| s.transport.pause())
            .unwrap_or(false)
    }

    pub fn stop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.transport.stop();
            session.cursor.reset();
        }
    }

    /// Jump to `seconds`, clamped to the timeline.
    ///
    /// Moving backwards rewinds dispatch so events after the new position fire
    /// again. Moving forwards fires the skipped events on the next tick.
    pub fn seek_to(&mut self, seconds: f64) {
        if let Some(session) = self.session.as_mut() {
            if session.transport.seek(seconds) {
                let position = session.transport.position();
                session.cursor.reset_to(&session.timeline, position);
            }
        }
    }

    /// Advance to wall-clock `now` and fire every callback that came due.
    ///
    /// Returns the number of callbacks fired.
    pub fn tick(&mut self, now: f64) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let Some(advance) = session.transport.tick(now) else {
            return 0;
        };

        let handlers = self.registry.snapshot();
        let fired = session
            .cursor
            .advance(&session.timeline, advance.to, &handlers, self.notation);

        if advance.finished {
            session.cursor.reset();
            info!(duration = advance.to, "playback finished");
        }
        fired
    }

    pub fn set_playback_rate(&mut self, rate: f64) -> bool {
        if !rate.is_finite() || rate <= 0.0 {
            warn!(rate, "ignoring invalid playback rate");
            return false;
        }
        self.config.playback_rate = rate;
        if let Some(session) = self.session.as_mut() {
            session.transport.set_playback_rate(rate);
        }
        true
    }

    pub fn state(&self) -> PlayState {
        self.session
            .as_ref()
            .map(|s| s.transport.state())
            .unwrap_or(PlayState::Stopped)
    }

    pub fn transport_state(&self) -> TransportState {
        self.session
            .as_ref()
            .map(|s| s.transport.snapshot())
            .unwrap_or(TransportState {
                is_playing: false,
                position_seconds: 0.0,
                last_tick_wall_clock: None,
            })
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayState::Playing
    }

    pub fn current_time(&self) -> f64 {
        self.session
            .as_ref()
            .map(|s| s.transport.position())
            .unwrap_or(0.0)
    }

    pub fn duration(&self) -> f64 {
        self.session
            .as_ref()
            .map(|s| s.timeline.duration_seconds)
            .unwrap_or(0.0)
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{DispatchedEvent, EventQueue};
    use crate::prefs::MemoryStore;
    use crate::timeline::NoteEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn note(midi: u8, start: f64, end: f64) -> NoteEvent {
        NoteEvent {
            note_name: String::new(),
            midi_number: midi,
            velocity: 1.0,
            start_time: start,
            end_time: end,
            track_index: 0,
            channel: 0,
        }
    }

    fn loaded() -> (Player, EventQueue) {
        let mut player = Player::default();
        let queue = EventQueue::new();
        player.install_handlers(queue.handlers());
        player.load_timeline(Timeline::from_notes(
            vec![note(60, 0.0, 1.0), note(62, 1.0, 2.0), note(64, 2.0, 3.0)],
            0.030,
        ));
        (player, queue)
    }

    fn note_starts(queue: &EventQueue) -> Vec<u8> {
        queue
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                DispatchedEvent::NoteStart(n) => Some(n.midi_number),
                _ => None,
            })
            .collect()
    }

    /// One quarter note of `key` at 120 BPM, so the file lasts half a second.
    fn one_note_file(key: u8) -> Vec<u8> {
        let mut bytes = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x01\xe0".to_vec();
        let track = [0x00, 0x90, key, 100, 0x83, 0x60, 0x80, key, 0, 0x00, 0xff, 0x2f, 0x00];
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track);
        bytes
    }

    fn poll_until_done(player: &mut Player) -> Result<TimelineMetadata, LoadError> {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = player.poll_load() {
                return result;
            }
            assert!(std::time::Instant::now() < deadline, "load never finished");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_poll_installs_newest_background_load() {
        let mut player = Player::default();
        let readied = Arc::new(AtomicUsize::new(0));
        let r = readied.clone();
        player.on_ready(move |meta| {
            r.store(meta.note_count, Ordering::SeqCst);
        });

        player.begin_load(one_note_file(60));
        player.begin_load(one_note_file(72));
        poll_until_done(&mut player).unwrap();

        let timeline = player.timeline().unwrap();
        assert_eq!(timeline.events.len(), 1);
        assert_eq!(timeline.events[0].midi_number, 72);
        assert_eq!(readied.load(Ordering::SeqCst), 1);
        assert!(!player.is_loading());

        // The first request's result, if it arrives late, is never applied
        std::thread::sleep(Duration::from_millis(50));
        assert!(player.poll_load().is_none());
        assert_eq!(player.timeline().unwrap().events[0].midi_number, 72);
    }

    #[test]
    fn test_cancelled_background_load_keeps_current_timeline() {
        let (mut player, _queue) = loaded();
        player.begin_load(one_note_file(72));
        assert!(player.cancel_load());

        std::thread::sleep(Duration::from_millis(100));
        assert!(player.poll_load().is_none());
        assert_eq!(player.metadata().map(|m| m.note_count), Some(3));
        assert_eq!(player.duration(), 3.0);
    }

    #[test]
    fn test_failed_background_load_keeps_current_timeline() {
        let (mut player, _queue) = loaded();
        player.begin_load(b"MThd\x00\x00\x00\x06\x00\x02\x00\x01\x01\xe0".to_vec());

        let err = poll_until_done(&mut player).unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
        assert_eq!(player.metadata().map(|m| m.note_count), Some(3));
    }

    #[test]
    fn test_transport_state_snapshot() {
        let (mut player, _queue) = loaded();
        assert_eq!(player.transport_state().last_tick_wall_clock, None);

        player.start(4.0);
        player.tick(4.5);
        let state = player.transport_state();
        assert!(state.is_playing);
        assert_eq!(state.position_seconds, 0.5);
        assert_eq!(state.last_tick_wall_clock, Some(4.5));
    }

    #[test]
    fn test_transport_is_inert_before_load() {
        let mut player = Player::default();
        assert!(!player.start(0.0));
        assert_eq!(player.tick(1.0), 0);
        player.seek_to(5.0);
        assert_eq!(player.current_time(), 0.0);
        assert_eq!(player.metadata(), None);
    }

    #[test]
    fn test_ready_callback_waits_for_load() {
        let mut player = Player::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        player.on_ready(move |meta| {
            assert_eq!(meta.note_count, 1);
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        player.load_timeline(Timeline::from_notes(vec![note(60, 0.0, 1.0)], 0.030));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Already loaded: fires right away, and the earlier callback does not fire again
        let c = calls.clone();
        player.on_ready(move |_| {
            c.fetch_add(10, Ordering::SeqCst);
        });
        player.load_timeline(Timeline::from_notes(vec![note(60, 0.0, 1.0)], 0.030));
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_stop_then_start_replays_from_beginning() {
        let (mut player, queue) = loaded();
        player.start(0.0);
        player.tick(1.5);
        assert_eq!(note_starts(&queue), vec![60, 62]);

        player.stop();
        assert_eq!(player.current_time(), 0.0);
        player.start(10.0);
        player.tick(10.1);
        assert_eq!(note_starts(&queue), vec![60]);
    }

    #[test]
    fn test_backward_seek_refires_later_events() {
        let (mut player, queue) = loaded();
        player.start(0.0);
        player.tick(2.5);
        queue.drain();

        player.seek_to(0.5);
        player.tick(3.0);
        assert_eq!(note_starts(&queue), vec![62]);
        assert_eq!(player.current_time(), 1.0);
    }

    #[test]
    fn test_forward_seek_fires_skipped_events() {
        let (mut player, queue) = loaded();
        player.start(0.0);
        player.seek_to(2.5);
        player.tick(0.0);
        assert_eq!(note_starts(&queue), vec![60, 62, 64]);
    }

    #[test]
    fn test_playback_finishes_and_rewinds() {
        let (mut player, queue) = loaded();
        player.start(0.0);
        player.tick(10.0);
        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(player.current_time(), 0.0);
        assert_eq!(note_starts(&queue), vec![60, 62, 64]);

        player.start(20.0);
        player.tick(20.0);
        assert_eq!(note_starts(&queue), vec![60]);
    }

    #[test]
    fn test_failed_load_keeps_current_timeline() {
        let (mut player, _queue) = loaded();
        player.start(0.0);
        player.tick(1.5);

        assert!(player.load_bytes(b"not a midi file").is_err());
        assert_eq!(player.duration(), 3.0);
        assert_eq!(player.current_time(), 1.5);
        assert!(player.is_playing());
    }

    #[test]
    fn test_handlers_swap_mid_playback() {
        let (mut player, queue) = loaded();
        player.start(0.0);
        player.tick(0.5);
        assert_eq!(note_starts(&queue), vec![60]);

        let second = EventQueue::new();
        player.install_handlers(second.handlers());
        player.tick(1.5);
        assert!(queue.is_empty());
        assert_eq!(note_starts(&second), vec![62]);
        assert_eq!(player.current_time(), 1.5);
    }

    #[test]
    fn test_notation_preference_round_trip() {
        let mut store = MemoryStore::new();
        let mut player = Player::with_preferences(EngineConfig::default(), &store);
        assert_eq!(player.notation(), NotationScheme::Sharps);

        player.save_notation(NotationScheme::Flats, &mut store).unwrap();
        let reopened = Player::with_preferences(EngineConfig::default(), &store);
        assert_eq!(reopened.notation(), NotationScheme::Flats);
    }

    #[test]
    fn test_playback_rate_applies_to_loaded_timeline() {
        let (mut player, _queue) = loaded();
        assert!(player.set_playback_rate(2.0));
        assert!(!player.set_playback_rate(-1.0));
        player.start(0.0);
        player.tick(1.0);
        assert_eq!(player.current_time(), 2.0);
    }
}
