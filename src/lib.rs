pub mod callbacks;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod notation;
pub mod player;
pub mod prefs;
pub mod timeline;
pub mod transport;

pub use callbacks::{
    CallbackRegistry, ChordEnd, ChordNote, ChordStart, DispatchedEvent, EventQueue, HandlerResult,
    HandlerSet, NoteEnd, NoteStart,
};
pub use config::EngineConfig;
pub use dispatch::DispatchCursor;
pub use error::*;
pub use loader::{FileSource, Loader, MIDI_MIME_TYPES};
pub use notation::{note_name, NotationScheme, NOTATION_KEY};
pub use player::Player;
pub use prefs::{MemoryStore, PreferenceStore, YamlFileStore};
pub use timeline::{
    aggregate, parse, parse_with, Boundary, BoundaryKind, ChordEvent, NoteEvent, TempoChange,
    Timeline, TimelineMetadata, DEFAULT_EPSILON_MS,
};
pub use transport::{Advance, PlayState, TransportClock, TransportState};

