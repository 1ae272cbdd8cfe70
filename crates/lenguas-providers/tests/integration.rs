//! Upstream integration tests against the real API.
//!
//! These tests are skipped when `OPENAI_API_KEY` is not set.
//! Run with: `cargo test -p lenguas-providers --test integration`

use std::time::Duration;

use futures::StreamExt;
use lenguas_core::config::UpstreamConfig;
use lenguas_core::error::TranslatorError;
use lenguas_core::languages;
use lenguas_core::session::RealtimeParams;
use lenguas_providers::openai::OpenAiUpstream;
use lenguas_providers::{UpstreamProvider, VoiceParams};

fn openai_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

fn upstream(key: String) -> OpenAiUpstream {
    let config = UpstreamConfig {
        api_key: Some(key),
        ..Default::default()
    };
    OpenAiUpstream::from_config(&config, Duration::from_secs(60)).unwrap()
}

#[tokio::test]
async fn test_openai_translate() {
    let Some(key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };
    let upstream = upstream(key);
    let instructions = languages::build_instructions("maya", false).unwrap();

    let text = upstream.translate(&instructions, "Buenos días").await;
    assert!(text.is_ok(), "translate failed: {:?}", text.err());
    assert!(!text.unwrap().is_empty());
}

#[tokio::test]
async fn test_openai_synthesize_streams_audio() {
    let Some(key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };
    let upstream = upstream(key);

    let mut stream = upstream
        .synthesize("Ma'alob k'iin", &VoiceParams::default())
        .await
        .expect("synthesize failed");

    let mut total = 0;
    while let Some(chunk) = stream.next().await {
        total += chunk.expect("audio chunk error").len();
    }
    assert!(total > 0, "expected audio bytes");
}

#[tokio::test]
async fn test_openai_ephemeral_session() {
    let Some(key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };
    let upstream = upstream(key);

    let session = upstream
        .create_ephemeral_session(&RealtimeParams::default())
        .await
        .expect("session creation failed");
    assert!(!session.session_id.is_empty());
    assert!(session.connection_uri.starts_with("wss://"));
    assert!(session.client_secret.is_some());
}

#[tokio::test]
async fn test_openai_bad_key_is_auth_error() {
    if openai_key().is_none() {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    }
    let upstream = upstream("sk-invalid".into());

    let err = upstream.translate("Traduce", "Hola").await.unwrap_err();
    assert!(matches!(err, TranslatorError::UpstreamAuth(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_upstream_is_unavailable() {
    let config = UpstreamConfig {
        api_key: Some("sk-test".into()),
        base_url: Some("http://127.0.0.1:1".into()),
        ..Default::default()
    };
    let upstream = OpenAiUpstream::from_config(&config, Duration::from_secs(2)).unwrap();

    let err = upstream.translate("Traduce", "Hola").await.unwrap_err();
    assert!(matches!(err, TranslatorError::UpstreamUnavailable(_)), "got {err:?}");
}
