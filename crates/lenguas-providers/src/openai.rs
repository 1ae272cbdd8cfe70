//! OpenAI upstream provider.
//!
//! Realtime sessions via `/v1/realtime/sessions`, transcription via
//! `/v1/audio/transcriptions`, translation via a non-streaming
//! `/v1/chat/completions` call and speech via `/v1/audio/speech`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use lenguas_core::config::UpstreamConfig;
use lenguas_core::error::{Result, TranslatorError};
use lenguas_core::session::RealtimeParams;

use crate::{AudioStream, EphemeralSession, UpstreamProvider, VoiceParams};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_CHAT_MODEL: &str = "gpt-4-turbo-preview";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 500;

pub struct OpenAiUpstream {
    pub base_url: String,
    api_key: String,
    client: reqwest::Client,
    chat_model: String,
    transcription_model: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl OpenAiUpstream {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            chat_model: DEFAULT_CHAT_MODEL.into(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    /// Build from config. Every request is bounded by `timeout`.
    pub fn from_config(config: &UpstreamConfig, timeout: Duration) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            TranslatorError::Config("no upstream API key (set OPENAI_API_KEY)".into())
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TranslatorError::Config(format!("HTTP client: {e}")))?;

        let mut upstream = Self::new(api_key, config.base_url.as_deref());
        upstream.client = client;
        if let Some(model) = &config.chat_model {
            upstream.chat_model = model.clone();
        }
        if let Some(model) = &config.transcription_model {
            upstream.transcription_model = model.clone();
        }
        if let Some(t) = config.temperature {
            upstream.temperature = t;
        }
        if let Some(n) = config.max_output_tokens {
            upstream.max_output_tokens = n;
        }
        Ok(upstream)
    }

    /// WebSocket base derived from the HTTP base URL.
    pub fn ws_base_url(&self) -> String {
        ws_base_url(&self.base_url)
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        check_status(response).await
    }
}

fn ws_base_url(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    }
}

/// Map a reqwest transport failure. The URL is stripped so credentials in
/// query strings never reach logs.
fn map_transport_error(err: reqwest::Error) -> TranslatorError {
    if err.is_timeout() || err.is_connect() {
        TranslatorError::UpstreamUnavailable(err.without_url().to_string())
    } else if err.is_decode() {
        TranslatorError::UpstreamRejected(format!("unreadable response: {}", err.without_url()))
    } else {
        TranslatorError::UpstreamUnavailable(err.without_url().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

/// Map a non-success status and its body into an error. Only the provider's
/// `error.message` is kept; the raw body is dropped.
fn error_for_status(status: StatusCode, body: &str) -> TranslatorError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    let detail = format!("{} {message}", status.as_u16());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TranslatorError::UpstreamAuth(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            TranslatorError::UpstreamUnavailable(detail)
        }
        s if s.is_server_error() => TranslatorError::UpstreamUnavailable(detail),
        _ => TranslatorError::UpstreamRejected(detail),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status, &body))
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct RealtimeSessionResponse {
    id: String,
    #[serde(default)]
    expires_at: i64,
    #[serde(default)]
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[async_trait]
impl UpstreamProvider for OpenAiUpstream {
    fn id(&self) -> &str {
        "openai"
    }

    async fn create_ephemeral_session(&self, params: &RealtimeParams) -> Result<EphemeralSession> {
        let body = json!({ "model": params.model, "voice": params.voice });
        debug!(model = %params.model, "Creating realtime session");

        let response = self.post_json("/v1/realtime/sessions", &body).await?;
        let session: RealtimeSessionResponse =
            response.json().await.map_err(map_transport_error)?;

        let (client_secret, secret_expiry) = match session.client_secret {
            Some(secret) => (Some(secret.value), secret.expires_at),
            None => (None, None),
        };

        Ok(EphemeralSession {
            connection_uri: format!("{}/v1/realtime?model={}", self.ws_base_url(), params.model),
            session_id: session.id,
            expires_at: secret_expiry.unwrap_or(session.expires_at),
            client_secret,
        })
    }

    async fn transcribe(&self, audio: Bytes, language_hint: &str) -> Result<String> {
        let size = audio.len();
        let part = reqwest::multipart::Part::stream(audio)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(map_transport_error)?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .text("language", language_hint.to_string())
            .text("response_format", "json")
            .part("file", part);

        debug!(bytes = size, language = language_hint, "Transcribing audio");

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_status(response).await?;

        let transcription: TranscriptionResponse =
            response.json().await.map_err(map_transport_error)?;
        Ok(transcription.text)
    }

    async fn translate(&self, instructions: &str, text: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: instructions,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
        };

        debug!(model = %self.chat_model, chars = text.chars().count(), "Translating text");

        let response = self.post_json("/v1/chat/completions", &body).await?;
        let completion: ChatResponse = response.json().await.map_err(map_transport_error)?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| TranslatorError::UpstreamRejected("completion had no content".into()))
    }

    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<AudioStream> {
        let body = json!({
            "model": voice.model,
            "voice": voice.voice,
            "input": text,
            "response_format": voice.format,
            "speed": voice.speed,
        });

        debug!(model = %voice.model, format = %voice.format, "Synthesizing speech");

        let response = self.post_json("/v1/audio/speech", &body).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_transport_error));
        Ok(Box::pin(stream))
    }
}
