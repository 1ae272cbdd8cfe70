//! Axum-based HTTP and WebSocket server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    http::{HeaderValue, Method, header},
    response::IntoResponse,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api;
use crate::connection::handle_ws_connection;
use crate::state::GatewayState;

/// Build the application router for `state`.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins());
    let body_limit = state.config.max_body_bytes();

    let router = Router::new()
        .route("/", get(api::root_handler))
        .route("/api/health", get(api::health_handler))
        .route("/api/languages", get(api::languages_handler))
        .route("/api/translate", post(api::translate_handler))
        .route("/api/translate-audio", post(api::translate_audio_handler))
        .route("/api/session", post(api::session_handler))
        .route("/ws", get(ws_handler));

    #[cfg(feature = "metrics")]
    let router = router
        .route("/metrics", get(metrics_handler))
        .route_layer(axum::middleware::from_fn(track_requests));

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins; `*` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Serve on an already-bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, state: Arc<GatewayState>) -> anyhow::Result<()> {
    let app = build_router(state);
    info!("Gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Bind the configured address and serve.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{port}", state.config.bind_addr());
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, state).await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(state, socket))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (axum::http::StatusCode::OK, handle.render()),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}

#[cfg(feature = "metrics")]
/// Labels requests with the route template; unmatched paths never get here.
async fn track_requests(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let route = request
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map_or("unmatched", |path| path.as_str())
        .to_string();
    let start = std::time::Instant::now();
    let response = next.run(request).await;
    crate::metrics::record_request(&route, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "Failed to listen for Ctrl-C; shutdown signal disabled");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
