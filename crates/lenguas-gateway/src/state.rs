//! Gateway shared state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use lenguas_core::config::Config;
use lenguas_media::{ChainedPipeline, PipelineLimits};
use lenguas_providers::{RealtimeConnector, UpstreamProvider, VoiceParams};

use crate::relay::RelayDeps;

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub upstream: Arc<dyn UpstreamProvider>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub pipeline: ChainedPipeline,
    /// Live relay sessions, keyed by session id.
    pub sessions: RwLock<HashMap<String, DateTime<Utc>>>,
    #[cfg(feature = "metrics")]
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    pub fn new(
        config: Arc<Config>,
        upstream: Arc<dyn UpstreamProvider>,
        connector: Arc<dyn RealtimeConnector>,
    ) -> Self {
        let mut limits = PipelineLimits::from_config(&config);
        // Audio goes out base64-encoded, so the raw ceiling is 3/4 of the
        // response ceiling.
        limits.max_audio_bytes = limits
            .max_audio_bytes
            .min(config.max_response_bytes() / 4 * 3);

        let voice = VoiceParams::from_config(&config.upstream());
        let pipeline = ChainedPipeline::new(upstream.clone(), limits, voice);

        Self {
            config,
            upstream,
            connector,
            pipeline,
            sessions: RwLock::new(HashMap::new()),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    pub fn relay_deps(&self) -> RelayDeps {
        RelayDeps {
            upstream: self.upstream.clone(),
            connector: self.connector.clone(),
            params: self.config.realtime_params(),
            timeout: self.config.upstream_timeout(),
        }
    }

    pub async fn register_session(&self, id: &str, created_at: DateTime<Utc>) {
        self.sessions.write().await.insert(id.to_string(), created_at);
    }

    pub async fn unregister_session(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}
