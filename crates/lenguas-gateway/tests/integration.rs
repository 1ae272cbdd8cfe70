//! Gateway integration tests: start a real gateway and drive it over HTTP and WS.
//!
//! The upstream provider and realtime connector are in-process stubs.
//! Run with: `cargo test -p lenguas-gateway --test integration`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use lenguas_core::config::{Config, GatewayConfig};
use lenguas_core::error::{Result, TranslatorError};
use lenguas_core::session::RealtimeParams;
use lenguas_gateway::GatewayState;
use lenguas_providers::{
    AudioStream, EphemeralSession, RealtimeConnection, RealtimeConnector, UpstreamProvider,
    VoiceParams,
};

/// Upstream with canned answers.
struct StubUpstream {
    audio_len: usize,
    translations: AtomicUsize,
}

#[async_trait]
impl UpstreamProvider for StubUpstream {
    fn id(&self) -> &str {
        "stub"
    }

    async fn create_ephemeral_session(&self, _: &RealtimeParams) -> Result<EphemeralSession> {
        Ok(EphemeralSession {
            session_id: "sess_test".into(),
            expires_at: 1_900_000_000,
            connection_uri: "ws://stub/v1/realtime".into(),
            client_secret: Some("ek_hidden".into()),
        })
    }

    async fn transcribe(&self, _: Bytes, _: &str) -> Result<String> {
        Ok("Buenos días".into())
    }

    async fn translate(&self, _: &str, text: &str) -> Result<String> {
        self.translations.fetch_add(1, Ordering::SeqCst);
        match text {
            "Buenos días" => Ok("Ma'alob k'iin".into()),
            _ => Err(TranslatorError::UpstreamUnavailable("stub has no answer".into())),
        }
    }

    async fn synthesize(&self, _: &str, _: &VoiceParams) -> Result<AudioStream> {
        let audio = Bytes::from(vec![7u8; self.audio_len]);
        Ok(Box::pin(futures::stream::iter(vec![Ok(audio)])))
    }
}

/// Connector whose upstream echoes every frame except `session.update`.
struct EchoConnector;

#[async_trait]
impl RealtimeConnector for EchoConnector {
    async fn connect(&self, _: &EphemeralSession) -> Result<RealtimeConnection> {
        let (conn, mut peer) = RealtimeConnection::pair(16);
        tokio::spawn(async move {
            while let Some(frame) = peer.from_relay.recv().await {
                if frame.text().is_some_and(|t| t.contains("session.update")) {
                    continue;
                }
                if peer.to_relay.send(frame).await.is_err() {
                    break;
                }
            }
        });
        Ok(conn)
    }
}

/// Start a gateway on a free port and return its state, port and upstream.
async fn start_test_gateway(
    config: Config,
    audio_len: usize,
) -> (Arc<GatewayState>, u16, Arc<StubUpstream>) {
    let upstream = Arc::new(StubUpstream {
        audio_len,
        translations: AtomicUsize::new(0),
    });
    let state = Arc::new(GatewayState::new(
        Arc::new(config),
        upstream.clone(),
        Arc::new(EchoConnector),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let state_clone = state.clone();
    tokio::spawn(async move {
        let _ = lenguas_gateway::serve(listener, state_clone).await;
    });

    (state, port, upstream)
}

async fn post(port: u16, path: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}{path}"))
        .json(&body)
        .send()
        .await
        .expect("request failed");
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn next_json(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> serde_json::Value {
    let msg = ws.next().await.unwrap().unwrap();
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn test_translate_buenos_dias_to_maya() {
    let (_state, port, _) = start_test_gateway(Config::default(), 16).await;

    let (status, body) = post(
        port,
        "/api/translate",
        json!({"text": "Buenos días", "language": "maya"}),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({
            "success": true,
            "data": {"original": "Buenos días", "translation": "Ma'alob k'iin", "language": "maya"}
        })
    );
}

#[tokio::test]
async fn test_translate_invalid_language() {
    let (_state, port, upstream) = start_test_gateway(Config::default(), 16).await;

    let (status, body) = post(
        port,
        "/api/translate",
        json!({"text": "Hola", "language": "klingon"}),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body, json!({"success": false, "error": "Invalid language: klingon"}));
    assert_eq!(upstream.translations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_translate_upstream_failure_is_500() {
    let (_state, port, _) = start_test_gateway(Config::default(), 16).await;

    let (status, body) = post(port, "/api/translate", json!({"text": "¿Qué tal?"})).await;

    assert_eq!(status, 500);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("stub has no answer"));
}

#[tokio::test]
async fn test_languages_endpoint() {
    let (_state, port, _) = start_test_gateway(Config::default(), 16).await;

    let body: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{port}/api/languages"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], true);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 8);
    assert_eq!(data[0]["id"], "maya");
    assert!(data[0]["nameNative"].is_string());
}

#[tokio::test]
async fn test_translate_audio_round_trip() {
    let (_state, port, _) = start_test_gateway(Config::default(), 1024).await;

    let (status, body) = post(
        port,
        "/api/translate-audio",
        json!({"audio": "UklGRgAAAABXQVZF", "language": "maya", "includesTramitesContext": true}),
    )
    .await;

    assert_eq!(status, 200, "body: {body}");
    let data = &body["data"];
    assert_eq!(data["transcript"], "Buenos días");
    assert_eq!(data["translation"], "Ma'alob k'iin");
    assert_eq!(data["truncated"], false);
    assert_eq!(data["audio"].as_str().unwrap().len(), 1368);
}

#[tokio::test]
async fn test_translate_audio_over_response_ceiling() {
    let config = Config {
        gateway: Some(GatewayConfig {
            max_response_bytes: Some(1000),
            ..Default::default()
        }),
        ..Default::default()
    };
    let (_state, port, _) = start_test_gateway(config, 2000).await;

    let (status, body) = post(
        port,
        "/api/translate-audio",
        json!({"audio": "UklGRgAAAABXQVZF", "language": "maya"}),
    )
    .await;

    assert_eq!(status, 413);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Payload too large"));
}

#[tokio::test]
async fn test_translate_audio_missing_audio() {
    let (_state, port, _) = start_test_gateway(Config::default(), 16).await;

    let (status, body) = post(port, "/api/translate-audio", json!({"language": "maya"})).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "Audio required");
}

#[tokio::test]
async fn test_session_endpoint_hides_client_secret() {
    let (_state, port, _) = start_test_gateway(Config::default(), 16).await;

    let (status, body) = post(port, "/api/session", json!({"language": "tzeltal"})).await;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["sessionId"], "sess_test");
    assert_eq!(body["data"]["language"], "tzeltal");
    assert_eq!(body["data"]["expiresAt"], 1_900_000_000);
    assert_eq!(body["data"]["wsUrl"], format!("ws://127.0.0.1:{port}/ws"));
    assert!(!body.to_string().contains("ek_hidden"));
}

#[tokio::test]
async fn test_ws_not_configured_then_relay() {
    let (state, port, _) = start_test_gateway(Config::default(), 16).await;

    let url = format!("ws://127.0.0.1:{port}/ws");
    let (mut ws, _) = connect_async(&url).await.expect("WS connect failed");

    // Anything before configure gets exactly one error; the socket stays open.
    ws.send(Message::Text(r#"{"type":"input_audio_buffer.commit"}"#.into()))
        .await
        .unwrap();
    let err = next_json(&mut ws).await;
    assert_eq!(err, json!({"type": "error", "error": "Session not configured"}));

    ws.send(Message::Text(
        json!({"type": "session.configure", "language": "totonaco"}).to_string().into(),
    ))
    .await
    .unwrap();
    let ready = next_json(&mut ws).await;
    assert_eq!(ready["type"], "session.ready");
    assert_eq!(ready["language"], "totonaco");
    assert_eq!(state.active_sessions().await, 1);

    // Frames come back verbatim through the echoing upstream.
    ws.send(Message::Text(r#"{"type":"response.create"}"#.into()))
        .await
        .unwrap();
    ws.send(Message::Binary(Bytes::from_static(b"\x00\x01\x02")))
        .await
        .unwrap();
    assert_eq!(
        ws.next().await.unwrap().unwrap(),
        Message::Text(r#"{"type":"response.create"}"#.into())
    );
    assert_eq!(
        ws.next().await.unwrap().unwrap(),
        Message::Binary(Bytes::from_static(b"\x00\x01\x02"))
    );

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_ws_invalid_language_closes() {
    let (_state, port, _) = start_test_gateway(Config::default(), 16).await;

    let url = format!("ws://127.0.0.1:{port}/ws");
    let (mut ws, _) = connect_async(&url).await.expect("WS connect failed");

    ws.send(Message::Text(
        json!({"type": "session.configure", "language": "klingon"}).to_string().into(),
    ))
    .await
    .unwrap();

    let err = next_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["error"], "Invalid language: klingon");

    // Server closes after the error.
    let next = ws.next().await;
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}

#[tokio::test]
async fn test_health_counts_relay_sessions() {
    let (_state, port, _) = start_test_gateway(Config::default(), 16).await;

    let body: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{port}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeSessions"], 0);
    assert!(body["version"].is_string());
}
