use serde::Serialize;
use tonnetz::{
    EngineConfig, EventQueue, FileSource, LoadError, MemoryStore, NotationScheme, Player,
    PreferenceStore, NOTATION_KEY,
};
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
struct JsLoadError {
    kind: &'static str,
    message: String,
}

fn load_error_to_js(e: LoadError) -> JsValue {
    let kind = match &e {
        LoadError::UnsupportedFile { .. } => "unsupportedFile",
        LoadError::Parse(parse) => match parse.kind() {
            tonnetz::ParseErrorKind::MalformedHeader => "malformedHeader",
            tonnetz::ParseErrorKind::UnsupportedFormat => "unsupportedFormat",
            tonnetz::ParseErrorKind::TruncatedData => "truncatedData",
        },
        LoadError::Io { .. } => "io",
        LoadError::Superseded { .. } => "superseded",
    };
    let error = JsLoadError {
        kind,
        message: e.to_string(),
    };
    JsValue::from_str(&serde_json::to_string(&error).unwrap_or_else(|_| error.message.clone()))
}

/// Playback engine handle for the browser.
///
/// The page owns the animation loop and calls `tick(performance.now() / 1000)`
/// each frame; the returned JSON array lists every callback that came due.
#[wasm_bindgen]
pub struct WasmPlayer {
    player: Player,
    queue: EventQueue,
    prefs: MemoryStore,
}

#[wasm_bindgen]
impl WasmPlayer {
    /// `notation` is the value the page persisted last time (from localStorage), if any.
    #[wasm_bindgen(constructor)]
    pub fn new(notation: Option<String>) -> WasmPlayer {
        let mut prefs = MemoryStore::new();
        if let Some(value) = notation {
            // MemoryStore writes cannot fail
            let _ = prefs.set(NOTATION_KEY, &value);
        }
        let player = Player::with_preferences(EngineConfig::default(), &prefs);
        let queue = EventQueue::new();
        player.install_handlers(queue.handlers());
        WasmPlayer {
            player,
            queue,
            prefs,
        }
    }

    /// Reject a picked or dropped file by name and MIME type before reading it.
    #[wasm_bindgen(js_name = checkFile)]
    pub fn check_file(&self, name: &str, mime: Option<String>) -> Result<(), JsValue> {
        FileSource::new(name, mime.as_deref())
            .check(self.player.config())
            .map_err(load_error_to_js)
    }

    /// Parse a MIDI file and make it current. Returns its metadata.
    pub fn load(&mut self, bytes: &[u8]) -> Result<JsValue, JsValue> {
        let metadata = self.player.load_bytes(bytes).map_err(load_error_to_js)?;
        self.queue.drain();
        serde_wasm_bindgen::to_value(&metadata).map_err(JsValue::from)
    }

    pub fn start(&mut self, now: f64) -> bool {
        self.player.start(now)
    }

    pub fn pause(&mut self) -> bool {
        self.player.pause()
    }

    pub fn stop(&mut self) {
        self.player.stop();
    }

    #[wasm_bindgen(js_name = seekTo)]
    pub fn seek_to(&mut self, seconds: f64) {
        self.player.seek_to(seconds);
    }

    /// Advance to `now` (seconds) and return the fired events as a JSON array.
    pub fn tick(&mut self, now: f64) -> String {
        self.player.tick(now);
        serde_json::to_string(&self.queue.drain()).unwrap_or_else(|_| "[]".to_string())
    }

    #[wasm_bindgen(js_name = isPlaying)]
    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    #[wasm_bindgen(js_name = currentTime)]
    pub fn current_time(&self) -> f64 {
        self.player.current_time()
    }

    pub fn duration(&self) -> f64 {
        self.player.duration()
    }

    /// Metadata of the loaded file, or `undefined` before the first load.
    pub fn metadata(&self) -> Result<JsValue, JsValue> {
        match self.player.metadata() {
            Some(metadata) => serde_wasm_bindgen::to_value(&metadata).map_err(JsValue::from),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    #[wasm_bindgen(js_name = setPlaybackRate)]
    pub fn set_playback_rate(&mut self, rate: f64) -> bool {
        self.player.set_playback_rate(rate)
    }

    /// Switch note spelling. The page persists `notation()` afterwards.
    #[wasm_bindgen(js_name = setNotation)]
    pub fn set_notation(&mut self, scheme: &str) -> Result<(), JsValue> {
        let scheme: NotationScheme = scheme.parse().map_err(|e: String| JsValue::from_str(&e))?;
        self.player
            .save_notation(scheme, &mut self.prefs)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn notation(&self) -> String {
        self.player.notation().to_string()
    }
}
