//! Upstream provider abstraction.
//!
//! The upstream provider performs transcription, translation, speech
//! synthesis and hosts realtime sessions. Each operation maps to exactly one
//! upstream call. Failures are mapped into
//! [`TranslatorError`](lenguas_core::error::TranslatorError) and returned to
//! the caller. Nothing is retried here.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;

use lenguas_core::config::UpstreamConfig;
use lenguas_core::error::Result;
use lenguas_core::session::RealtimeParams;

#[cfg(feature = "openai")]
pub mod openai;
pub mod realtime;

pub use realtime::{RealtimeConnection, RealtimeConnector, RealtimePeer, RealtimeSender};

/// An opaque realtime protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            Frame::Binary(_) => None,
        }
    }
}

/// Incrementally delivered synthesized audio.
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A provider-issued handle authorizing one realtime connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralSession {
    pub session_id: String,
    /// Unix timestamp (seconds) after which the session can no longer be used.
    pub expires_at: i64,
    pub connection_uri: String,
    #[serde(skip)]
    pub client_secret: Option<String>,
}

/// Speech synthesis parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    pub model: String,
    pub voice: String,
    pub format: String,
    pub speed: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            model: "tts-1".into(),
            voice: "alloy".into(),
            format: "opus".into(),
            speed: 1.0,
        }
    }
}

impl VoiceParams {
    /// Defaults with the `speech_model`, `voice` and `speech_format`
    /// overrides from config applied.
    pub fn from_config(config: &UpstreamConfig) -> Self {
        let mut params = Self::default();
        if let Some(model) = &config.speech_model {
            params.model = model.clone();
        }
        if let Some(voice) = &config.voice {
            params.voice = voice.clone();
        }
        if let Some(format) = &config.speech_format {
            params.format = format.clone();
        }
        params
    }
}

/// The four upstream operations.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Provider identifier (e.g. "openai").
    fn id(&self) -> &str;

    /// Request an ephemeral realtime session.
    async fn create_ephemeral_session(&self, params: &RealtimeParams) -> Result<EphemeralSession>;

    /// Transcribe raw audio bytes. The audio is passed through as-is; format
    /// validation is left to the provider.
    async fn transcribe(&self, audio: Bytes, language_hint: &str) -> Result<String>;

    /// Translate `text` with one system instruction and one user message.
    async fn translate(&self, instructions: &str, text: &str) -> Result<String>;

    /// Synthesize speech, returning the audio as it arrives.
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<AudioStream>;
}
