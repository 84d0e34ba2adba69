//! # Loading
//!
//! Getting bytes into a [`Timeline`]: the upload gate that rejects non-MIDI
//! files by name and MIME type, and a background loader that parses off the
//! tick thread.
//!
//! ## Supersession
//! Every request gets a generation number. Starting a new request or
//! cancelling makes every earlier generation stale, and results of stale
//! generations are dropped when they arrive. Workers are never interrupted;
//! their output is simply ignored.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{LoadError, ParseError};
use crate::timeline::{parse_with, Timeline};

/// MIME types browsers and file managers report for Standard MIDI Files.
pub const MIDI_MIME_TYPES: [&str; 6] = [
    "audio/midi",
    "audio/mid",
    "audio/x-midi",
    "audio/x-mid",
    "application/x-midi",
    "audio/sp-midi",
];

/// What a picker or drop target knows about a file before reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSource<'a> {
    pub name: &'a str,
    /// `None` or empty when the host could not tell
    pub mime: Option<&'a str>,
}

impl<'a> FileSource<'a> {
    pub fn new(name: &'a str, mime: Option<&'a str>) -> Self {
        Self { name, mime }
    }

    /// Reject files that are clearly not MIDI, without touching their contents.
    ///
    /// The extension must be in `allowed_extensions` (case-insensitive). A
    /// reported MIME type must be a MIDI type; a missing one, or the generic
    /// `application/octet-stream`, is accepted on the strength of the extension.
    ///
    /// # Example
    /// ```
    /// use tonnetz::{EngineConfig, FileSource};
    ///
    /// let config = EngineConfig::default();
    /// assert!(FileSource::new("prelude.MID", Some("audio/midi")).check(&config).is_ok());
    /// assert!(FileSource::new("prelude.mp3", None).check(&config).is_err());
    /// ```
    pub fn check(&self, config: &EngineConfig) -> Result<(), LoadError> {
        let extension = Path::new(self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        let allowed = extension
            .as_deref()
            .map(|ext| config.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if !allowed {
            return Err(self.reject(format!(
                "extension must be one of: {}",
                config.allowed_extensions.join(", ")
            )));
        }

        if let Some(mime) = self.mime.map(str::trim).filter(|m| !m.is_empty()) {
            let mime = mime.to_ascii_lowercase();
            if mime != "application/octet-stream" && !MIDI_MIME_TYPES.contains(&mime.as_str()) {
                return Err(self.reject(format!("'{}' is not a MIDI type", mime)));
            }
        }
        Ok(())
    }

    fn reject(&self, reason: String) -> LoadError {
        warn!(file = self.name, reason = %reason, "rejected upload");
        LoadError::UnsupportedFile {
            name: self.name.to_string(),
            reason,
        }
    }
}

struct Finished {
    generation: u64,
    result: Result<Timeline, ParseError>,
}

/// Parses uploads on worker threads and hands back only the newest result.
pub struct Loader {
    generation: u64,
    pending: Option<u64>,
    sender: Sender<Finished>,
    receiver: Receiver<Finished>,
}

impl Loader {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            generation: 0,
            pending: None,
            sender,
            receiver,
        }
    }

    /// Start parsing `bytes` on a new thread, superseding any request in flight.
    ///
    /// A superseded or cancelled parse is not interrupted: its worker runs to
    /// completion and the result is dropped when it arrives with a stale
    /// generation.
    ///
    /// Native targets only. `thread::spawn` panics on `wasm32-unknown-unknown`,
    /// so browser hosts parse with [`parse_with`] on the calling thread.
    pub fn begin(&mut self, bytes: Vec<u8>, config: &EngineConfig) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        if let Some(previous) = self.pending.replace(generation) {
            debug!(previous, generation, "superseding in-flight load");
        }

        let sender = self.sender.clone();
        let config = config.clone();
        thread::spawn(move || {
            let result = parse_with(&bytes, &config);
            // The receiver only goes away with the loader itself
            let _ = sender.send(Finished { generation, result });
        });

        debug!(generation, "load started");
        generation
    }

    /// Make every request so far stale. Returns `true` if one was in flight.
    ///
    /// The worker keeps running; only its result is discarded.
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        let cancelled = self.pending.take();
        if let Some(generation) = cancelled {
            debug!(generation, "load cancelled");
        }
        cancelled.is_some()
    }

    /// Generation of the request still awaiting a result, if any.
    pub fn pending(&self) -> Option<u64> {
        self.pending
    }

    /// Non-blocking: the current request's result if it has arrived.
    pub fn poll(&mut self) -> Option<Result<Timeline, LoadError>> {
        while let Ok(finished) = self.receiver.try_recv() {
            if let Some(result) = self.accept(finished) {
                return Some(result);
            }
        }
        None
    }

    /// Block for up to `timeout` waiting for request `generation`.
    ///
    /// Returns `Some(Err(LoadError::Superseded))` if that request is no longer
    /// current, and `None` on timeout.
    pub fn wait(&mut self, generation: u64, timeout: Duration) -> Option<Result<Timeline, LoadError>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending != Some(generation) {
                return Some(Err(LoadError::Superseded { generation }));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(finished) => {
                    if let Some(result) = self.accept(finished) {
                        return Some(result);
                    }
                }
                Err(_) => return None,
            }
        }
    }

    fn accept(&mut self, finished: Finished) -> Option<Result<Timeline, LoadError>> {
        if self.pending != Some(finished.generation) {
            debug!(generation = finished.generation, "discarding stale load result");
            return None;
        }
        self.pending = None;
        Some(finished.result.map_err(LoadError::from))
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    /// One track, one quarter note of middle C at 120 BPM.
    fn single_note_file() -> Vec<u8> {
        let mut bytes = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x01\xe0".to_vec();
        let track = [
            0x00, 0x90, 60, 100, // note on
            0x83, 0x60, 0x80, 60, 0, // 480 ticks later, note off
            0x00, 0xff, 0x2f, 0x00, // end of track
        ];
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track);
        bytes
    }

    #[test]
    fn test_extension_gate() {
        let config = EngineConfig::default();
        assert!(FileSource::new("song.midi", None).check(&config).is_ok());
        assert!(FileSource::new("song.Mid", Some("")).check(&config).is_ok());
        assert!(FileSource::new("song", None).check(&config).is_err());
        assert!(FileSource::new("song.wav", Some("audio/midi")).check(&config).is_err());
    }

    #[test]
    fn test_mime_gate() {
        let config = EngineConfig::default();
        assert!(FileSource::new("a.mid", Some("audio/x-midi")).check(&config).is_ok());
        assert!(FileSource::new("a.mid", Some("application/octet-stream"))
            .check(&config)
            .is_ok());
        let err = FileSource::new("a.mid", Some("image/png")).check(&config).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFile { ref name, .. } if name == "a.mid"));
    }

    #[test]
    fn test_configured_extensions() {
        let config = EngineConfig {
            allowed_extensions: vec!["smf".to_string()],
            ..EngineConfig::default()
        };
        assert!(FileSource::new("a.smf", None).check(&config).is_ok());
        assert!(FileSource::new("a.mid", None).check(&config).is_err());
    }

    #[test]
    fn test_background_load_delivers_result() {
        let mut loader = Loader::new();
        let generation = loader.begin(single_note_file(), &EngineConfig::default());
        let timeline = loader
            .wait(generation, Duration::from_secs(5))
            .expect("load timed out")
            .unwrap();
        assert_eq!(timeline.events.len(), 1);
        assert_eq!(loader.pending(), None);
    }

    #[test]
    fn test_parse_failure_is_reported() {
        let mut loader = Loader::new();
        let generation = loader.begin(b"MThd".to_vec(), &EngineConfig::default());
        match loader.wait(generation, Duration::from_secs(5)) {
            Some(Err(LoadError::Parse(e))) => assert_eq!(e.kind(), ParseErrorKind::TruncatedData),
            other => panic!("unexpected outcome {:?}", other.map(|r| r.map(|t| t.events.len()))),
        }
    }

    #[test]
    fn test_newer_request_supersedes_older() {
        let mut loader = Loader::new();
        let first = loader.begin(b"garbage".to_vec(), &EngineConfig::default());
        let second = loader.begin(single_note_file(), &EngineConfig::default());

        assert!(matches!(
            loader.wait(first, Duration::from_millis(10)),
            Some(Err(LoadError::Superseded { generation })) if generation == first
        ));
        let timeline = loader.wait(second, Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(timeline.events.len(), 1);
    }

    #[test]
    fn test_cancelled_result_is_dropped() {
        let mut loader = Loader::new();
        let generation = loader.begin(single_note_file(), &EngineConfig::default());
        assert!(loader.cancel());
        assert!(!loader.cancel());

        thread::sleep(Duration::from_millis(100));
        assert!(loader.poll().is_none());
        assert!(matches!(
            loader.wait(generation, Duration::from_millis(10)),
            Some(Err(LoadError::Superseded { .. }))
        ));
    }
}
