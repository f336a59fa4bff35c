pub mod engine;
pub mod sample;

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::AppError;

pub use engine::TtsEngine;
pub use sample::{SampleStore, DEFAULT_VOICE_ID};

/// Snapshot of the voice subsystem, derived on demand for
/// `GET /api/voice/status` and never cached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceStatus {
    pub has_voice_clone: bool,
    pub voice_id: Option<String>,
    pub available_voices: Vec<String>,
    pub tts_available: bool,
}

#[derive(Debug)]
struct VoiceState {
    auto_play: bool,
    current_voice_id: Option<String>,
}

/// The voice delegate: owns the sample store, the (optional) TTS engine and
/// the per-process settings. Constructed once in `main` and shared through
/// `AppState`. A `None` engine means the startup probe failed and the
/// service runs degraded; synthesis then short-circuits without ever
/// touching the engine again.
pub struct VoiceService {
    store: SampleStore,
    engine: Option<Mutex<TtsEngine>>,
    engine_voices: Vec<String>,
    state: Mutex<VoiceState>,
}

impl VoiceService {
    pub fn new(store: SampleStore, engine: Option<TtsEngine>) -> Self {
        let engine_voices = engine
            .as_ref()
            .map(|e| e.voice_names().to_vec())
            .unwrap_or_default();

        Self {
            store,
            engine: engine.map(Mutex::new),
            engine_voices,
            state: Mutex::new(VoiceState {
                auto_play: false,
                current_voice_id: None,
            }),
        }
    }

    pub fn status(&self) -> VoiceStatus {
        // The current-voice pointer is reported as-is even when its backing
        // file is gone; callers observe the dangling id.
        let current = self.state.lock().unwrap().current_voice_id.clone();

        VoiceStatus {
            has_voice_clone: self.store.has_samples(),
            voice_id: current,
            available_voices: self.engine_voices.clone(),
            tts_available: self.engine.is_some(),
        }
    }

    pub fn set_auto_play(&self, enabled: bool) {
        self.state.lock().unwrap().auto_play = enabled;
    }

    pub fn auto_play(&self) -> bool {
        self.state.lock().unwrap().auto_play
    }

    /// Store a sample and point the current voice at it.
    pub fn save_sample(&self, voice_id: &str, data: &[u8]) -> Result<PathBuf, AppError> {
        let path = self.store.save(voice_id, data)?;
        self.state.lock().unwrap().current_voice_id = Some(voice_id.to_string());
        Ok(path)
    }

    /// Render text to a WAV buffer. Synthesis is serialized: the engine
    /// cannot be driven from two handlers at once.
    pub fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>, AppError> {
        let engine = self.engine.as_ref().ok_or(AppError::TtsUnavailable)?;
        let engine = engine.lock().unwrap();

        let wav = engine.synthesize(text, voice_id)?;
        if wav.is_empty() {
            return Err(AppError::TtsFailed(
                "engine produced no audio output".to_string(),
            ));
        }

        Ok(wav)
    }
}
