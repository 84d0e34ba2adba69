//! # Callback Registry
//!
//! Consumers (the lattice renderer, a synth bridge, the wasm host) react to
//! playback through four handlers: note start, note end, chord start and chord
//! end.
//!
//! ## Hot-swapping
//! Handlers are grouped in a [`HandlerSet`] and installed as a whole. The
//! dispatch loop takes one snapshot of the current set per tick, so a swap never
//! shows a half-updated set and never disturbs transport state.
//!
//! ## Failures
//! A handler returning `Err` or panicking is logged and skipped. The remaining
//! callbacks for that tick still fire.
//!
//! ## Example
//! ```rust
//! use tonnetz::{CallbackRegistry, HandlerSet};
//!
//! let registry = CallbackRegistry::new();
//! registry.install(HandlerSet::new().on_note_start(|note| {
//!     println!("{} on", note.name);
//!     Ok(())
//! }));
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::error::HandlerError;

pub type HandlerResult = Result<(), HandlerError>;

type Handler<T> = Arc<dyn Fn(&T) -> HandlerResult + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteStart {
    pub name: String,
    pub midi_number: u8,
    pub velocity: f64,
    pub track_index: usize,
    /// Timeline position of the onset in seconds
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEnd {
    pub name: String,
    pub midi_number: u8,
    pub track_index: usize,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordNote {
    pub midi_number: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordStart {
    pub notes: Vec<ChordNote>,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordEnd {
    pub time: f64,
}

/// One fired callback, as recorded by [`EventQueue`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DispatchedEvent {
    NoteStart(NoteStart),
    NoteEnd(NoteEnd),
    ChordStart(ChordStart),
    ChordEnd(ChordEnd),
}

/// At most one handler per event kind.
#[derive(Clone, Default)]
pub struct HandlerSet {
    note_start: Option<Handler<NoteStart>>,
    note_end: Option<Handler<NoteEnd>>,
    chord_start: Option<Handler<ChordStart>>,
    chord_end: Option<Handler<ChordEnd>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_note_start(
        mut self,
        handler: impl Fn(&NoteStart) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.note_start = Some(Arc::new(handler));
        self
    }

    pub fn on_note_end(
        mut self,
        handler: impl Fn(&NoteEnd) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.note_end = Some(Arc::new(handler));
        self
    }

    pub fn on_chord_start(
        mut self,
        handler: impl Fn(&ChordStart) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.chord_start = Some(Arc::new(handler));
        self
    }

    pub fn on_chord_end(
        mut self,
        handler: impl Fn(&ChordEnd) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.chord_end = Some(Arc::new(handler));
        self
    }

    pub(crate) fn note_start(&self, payload: &NoteStart) {
        invoke("note-start", &self.note_start, payload);
    }

    pub(crate) fn note_end(&self, payload: &NoteEnd) {
        invoke("note-end", &self.note_end, payload);
    }

    pub(crate) fn chord_start(&self, payload: &ChordStart) {
        invoke("chord-start", &self.chord_start, payload);
    }

    pub(crate) fn chord_end(&self, payload: &ChordEnd) {
        invoke("chord-end", &self.chord_end, payload);
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("note_start", &self.note_start.is_some())
            .field("note_end", &self.note_end.is_some())
            .field("chord_start", &self.chord_start.is_some())
            .field("chord_end", &self.chord_end.is_some())
            .finish()
    }
}

fn invoke<T>(kind: &'static str, handler: &Option<Handler<T>>, payload: &T) {
    let Some(handler) = handler else {
        return;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(callback = kind, error = %e, "handler returned an error"),
        Err(_) => warn!(callback = kind, "handler panicked"),
    }
}

/// Holds the installed [`HandlerSet`] and swaps it atomically.
pub struct CallbackRegistry {
    current: ArcSwap<HandlerSet>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(HandlerSet::default()),
        }
    }

    /// Replace every handler at once.
    pub fn install(&self, handlers: HandlerSet) {
        self.current.store(Arc::new(handlers));
    }

    /// The set the dispatch loop uses for one tick.
    pub fn snapshot(&self) -> Arc<HandlerSet> {
        self.current.load_full()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("current", &**self.current.load())
            .finish()
    }
}

/// A consumer that records every dispatched event for later draining.
///
/// Hosts that prefer pulling events over being called back (the wasm bridge
/// drains after each tick) install [`EventQueue::handlers`].
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Arc<Mutex<Vec<DispatchedEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handlers(&self) -> HandlerSet {
        let note_start = self.events.clone();
        let note_end = self.events.clone();
        let chord_start = self.events.clone();
        let chord_end = self.events.clone();
        HandlerSet::new()
            .on_note_start(move |e| {
                note_start.lock().push(DispatchedEvent::NoteStart(e.clone()));
                Ok(())
            })
            .on_note_end(move |e| {
                note_end.lock().push(DispatchedEvent::NoteEnd(e.clone()));
                Ok(())
            })
            .on_chord_start(move |e| {
                chord_start.lock().push(DispatchedEvent::ChordStart(e.clone()));
                Ok(())
            })
            .on_chord_end(move |e| {
                chord_end.lock().push(DispatchedEvent::ChordEnd(*e));
                Ok(())
            })
    }

    pub fn drain(&self) -> Vec<DispatchedEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
