//! HTTP API handlers.
//!
//! Every `/api/*` response uses the `{success, data}` / `{success, error}`
//! envelope.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use lenguas_core::error::TranslatorError;
use lenguas_core::languages::{self, DEFAULT_LANGUAGE, LanguageConfig};

use crate::state::GatewayState;

pub const SERVICE_NAME: &str = "Lenguas Translator";

/// An error rendered as `{success: false, error}` with a mapped status.
#[derive(Debug)]
pub struct ApiError(pub TranslatorError);

impl From<TranslatorError> for ApiError {
    fn from(err: TranslatorError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(TranslatorError::MalformedInput(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            TranslatorError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Service-internal failures are not
    /// described.
    pub fn message(&self) -> String {
        match &self.0 {
            TranslatorError::Io(_)
            | TranslatorError::Json(_)
            | TranslatorError::Config(_)
            | TranslatorError::InternalRelay(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(kind = self.0.kind(), error = %self.0, "Request failed");
        }

        #[cfg(feature = "metrics")]
        crate::metrics::record_error(self.0.kind());

        let body = Json(json!({ "success": false, "error": self.message() }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<Envelope<T>>, ApiError>;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data,
    }))
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, alias = "includesTramitesContext")]
    pub include_domain_context: bool,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub original: String,
    pub translation: String,
    pub language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateAudioRequest {
    /// Base64-encoded audio.
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, alias = "includesTramitesContext")]
    pub include_domain_context: bool,
}

#[derive(Debug, Serialize)]
pub struct TranslateAudioResponse {
    pub transcript: String,
    pub translation: String,
    /// Base64-encoded synthesized speech.
    pub audio: String,
    pub language: String,
    pub truncated: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub ws_url: String,
    pub language: String,
    pub expires_at: i64,
}

pub async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
        "endpoints": {
            "health": "/api/health",
            "languages": "/api/languages",
            "translate": "POST /api/translate",
            "translateAudio": "POST /api/translate-audio",
            "session": "POST /api/session",
            "realtime": "/ws",
        }
    }))
}

pub async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "activeSessions": state.active_sessions().await,
    }))
}

pub async fn languages_handler() -> ApiResult<&'static [LanguageConfig]> {
    ok(languages::list())
}

pub async fn translate_handler(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<TranslateRequest>, JsonRejection>,
) -> ApiResult<TranslateResponse> {
    let Json(req) = body?;
    let text = req
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| TranslatorError::MissingInput("Text".into()))?;
    let instructions = languages::build_instructions(&req.language, req.include_domain_context)?;

    let translation = state.upstream.translate(&instructions, &text).await?;
    info!(language = %req.language, chars = text.chars().count(), "Text translated");

    ok(TranslateResponse {
        original: text,
        translation,
        language: req.language,
    })
}

pub async fn translate_audio_handler(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<TranslateAudioRequest>, JsonRejection>,
) -> ApiResult<TranslateAudioResponse> {
    let Json(req) = body?;
    let encoded = req
        .audio
        .filter(|a| !a.is_empty())
        .ok_or_else(|| TranslatorError::MissingInput("Audio".into()))?;
    languages::require(&req.language)?;

    let audio = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| TranslatorError::MalformedInput(format!("audio is not valid base64: {e}")))?;
    info!(input_kb = %format!("{:.2}", audio.len() as f64 / 1024.0), "Input audio received");

    let result = match state
        .pipeline
        .run(Bytes::from(audio), &req.language, req.include_domain_context)
        .await
    {
        Ok(result) => result,
        Err(err) => {
            warn!(
                stage = %err.stage,
                transcript = ?err.transcript,
                translation = ?err.translation,
                "Chained pipeline aborted"
            );
            #[cfg(feature = "metrics")]
            crate::metrics::record_stage_failure(err.stage.as_str());
            return Err(err.into_inner().into());
        }
    };

    let audio = BASE64.encode(&result.audio);
    let limit = state.config.max_response_bytes();
    if audio.len() > limit {
        return Err(TranslatorError::PayloadTooLarge {
            size: audio.len(),
            limit,
        }
        .into());
    }

    ok(TranslateAudioResponse {
        transcript: result.transcript,
        translation: result.translation,
        audio,
        language: result.language,
        truncated: result.truncated,
    })
}

pub async fn session_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Result<Json<SessionRequest>, JsonRejection>,
) -> ApiResult<SessionResponse> {
    let Json(req) = body?;
    languages::require(&req.language)?;

    let params = state.config.realtime_params();
    let session = state.upstream.create_ephemeral_session(&params).await?;
    info!(session_id = %session.session_id, language = %req.language, "Realtime session issued");

    ok(SessionResponse {
        session_id: session.session_id,
        ws_url: ws_url(state.config.public_ws_url(), &headers),
        language: req.language,
        expires_at: session.expires_at,
    })
}

/// Where clients should open the relay socket: the configured public URL,
/// else the request's `Host` on `/ws`.
fn ws_url(public: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = public {
        return url.to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("ws://{host}/ws")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TranslatorError::InvalidLanguage("x".into()), 400),
            (TranslatorError::MissingInput("Text".into()), 400),
            (TranslatorError::MalformedInput("bad".into()), 400),
            (TranslatorError::PayloadTooLarge { size: 2, limit: 1 }, 413),
            (TranslatorError::UpstreamUnavailable("down".into()), 500),
            (TranslatorError::UpstreamRejected("no".into()), 500),
            (TranslatorError::UpstreamAuth("401".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status().as_u16(), status);
        }
    }

    #[test]
    fn test_internal_errors_are_not_described() {
        let err = ApiError(TranslatorError::InternalRelay("state 3 -> 1".into()));
        assert_eq!(err.message(), "Internal server error");
        let err = ApiError(TranslatorError::MissingInput("Audio".into()));
        assert_eq!(err.message(), "Audio required");
    }

    #[test]
    fn test_translate_request_defaults_and_alias() {
        let req: TranslateRequest = serde_json::from_str(r#"{"text":"Hola"}"#).unwrap();
        assert_eq!(req.language, "maya");
        assert!(!req.include_domain_context);

        let req: TranslateRequest =
            serde_json::from_str(r#"{"text":"Hola","language":"otomi","includesTramitesContext":true}"#)
                .unwrap();
        assert_eq!(req.language, "otomi");
        assert!(req.include_domain_context);
    }

    #[test]
    fn test_ws_url_prefers_public_url() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "translator.example:8080".parse().unwrap());
        assert_eq!(ws_url(None, &headers), "ws://translator.example:8080/ws");
        assert_eq!(
            ws_url(Some("wss://lenguas.example/ws"), &headers),
            "wss://lenguas.example/ws"
        );
    }
}
