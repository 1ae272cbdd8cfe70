//! Per-session realtime configuration.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::languages;

pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";
pub const DEFAULT_VOICE: &str = "alloy";
pub const DEFAULT_REALTIME_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Server-side voice activity detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub detection_type: String,
    pub threshold: f64,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            detection_type: "server_vad".into(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Model and voice parameters shared by every realtime session.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeParams {
    pub model: String,
    pub voice: String,
    pub transcription_model: String,
    pub audio_format: String,
    pub turn_detection: TurnDetection,
    pub temperature: f64,
    pub max_response_output_tokens: u32,
}

impl Default for RealtimeParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_REALTIME_MODEL.into(),
            voice: DEFAULT_VOICE.into(),
            transcription_model: DEFAULT_REALTIME_TRANSCRIPTION_MODEL.into(),
            audio_format: "pcm16".into(),
            turn_detection: TurnDetection::default(),
            temperature: 0.7,
            max_response_output_tokens: 4096,
        }
    }
}

/// Configuration of one realtime session. Built once when the client
/// configures the session and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub language: String,
    pub include_domain_context: bool,
    pub instructions: String,
    pub params: RealtimeParams,
}

impl SessionConfig {
    /// Build the session config for `language`, failing with
    /// `InvalidLanguage` if it is not in the catalog.
    pub fn new(language: &str, include_domain_context: bool, params: RealtimeParams) -> Result<Self> {
        let instructions = languages::build_instructions(language, include_domain_context)?;
        Ok(Self {
            language: language.to_string(),
            include_domain_context,
            instructions,
            params,
        })
    }

    /// The `session.update` frame pushed upstream once the realtime
    /// connection is open.
    pub fn session_update(&self) -> serde_json::Value {
        let p = &self.params;
        json!({
            "type": "session.update",
            "session": {
                "modalities": ["text", "audio"],
                "instructions": self.instructions,
                "voice": p.voice,
                "input_audio_format": p.audio_format,
                "output_audio_format": p.audio_format,
                "input_audio_transcription": {
                    "model": p.transcription_model,
                },
                "turn_detection": p.turn_detection,
                "temperature": p.temperature,
                "max_response_output_tokens": p.max_response_output_tokens,
            }
        })
    }
}
