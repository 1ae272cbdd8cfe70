//! Realtime session relay.
//!
//! One [`RelaySession`] per downstream WebSocket. The session waits for a
//! `session.configure` control frame, opens the upstream realtime
//! connection, pushes the `session.update` frame, announces
//! `session.ready`, then forwards frames verbatim in both directions until
//! either side goes away.
//!
//! ```text
//! Idle ──configure──▶ Configuring ──▶ Connected ──▶ Relaying ──▶ Closed
//!                        │                │
//!                        └────────────────┴──▶ Failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lenguas_core::error::{Result, TranslatorError};
use lenguas_core::protocol::{ClientControl, ServerControl};
use lenguas_core::session::{RealtimeParams, SessionConfig};
use lenguas_providers::{Frame, RealtimeConnection, RealtimeConnector, UpstreamProvider};

pub const NOT_CONFIGURED: &str = "Session not configured";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Configuring,
    Connected,
    Relaying,
    Closed,
    Failed,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RelayState::Closed | RelayState::Failed)
    }
}

/// What a relay needs from the outside world.
#[derive(Clone)]
pub struct RelayDeps {
    pub upstream: Arc<dyn UpstreamProvider>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub params: RealtimeParams,
    /// Bound on ephemeral-session creation and on the upstream handshake.
    pub timeout: Duration,
}

pub struct RelaySession {
    id: String,
    created_at: DateTime<Utc>,
    state: RelayState,
    language: Option<String>,
    upstream: Option<RealtimeConnection>,
    client_tx: mpsc::Sender<Frame>,
    deps: RelayDeps,
}

impl RelaySession {
    pub fn new(deps: RelayDeps, client_tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            state: RelayState::Idle,
            language: None,
            upstream: None,
            client_tx,
            deps,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Drive the session until it reaches a terminal state. Returns that
    /// state.
    pub async fn run<S>(&mut self, mut client_rx: S) -> RelayState
    where
        S: Stream<Item = Frame> + Unpin,
    {
        let mut early = Vec::new();

        while self.state == RelayState::Idle {
            let Some(frame) = client_rx.next().await else {
                debug!(session_id = %self.id, "Client left before configuring");
                self.close();
                return self.state;
            };

            match frame.text().and_then(ClientControl::parse) {
                Some(ClientControl::Configure {
                    language,
                    include_domain_context,
                }) => {
                    early = self
                        .configure(&language, include_domain_context, &mut client_rx)
                        .await;
                }
                None => self.send_error(NOT_CONFIGURED).await,
            }
        }

        if self.state == RelayState::Relaying {
            self.relay(&mut client_rx, early).await;
        }
        self.close();
        self.state
    }

    /// Idle → Configuring → Connected → Relaying, or Failed.
    ///
    /// The client keeps being read while the upstream is set up: frames it
    /// sends in the meantime are returned for forwarding once relaying
    /// starts, and a client that leaves aborts the setup.
    async fn configure<S>(
        &mut self,
        language: &str,
        include_domain_context: bool,
        client_rx: &mut S,
    ) -> Vec<Frame>
    where
        S: Stream<Item = Frame> + Unpin,
    {
        self.state = RelayState::Configuring;
        let mut early = Vec::new();

        let outcome = {
            let establish = self.establish(language, include_domain_context);
            tokio::pin!(establish);
            loop {
                tokio::select! {
                    biased;
                    result = &mut establish => break Some(result),
                    frame = client_rx.next() => match frame {
                        Some(frame) => early.push(frame),
                        None => break None,
                    },
                }
            }
        };

        match outcome {
            Some(Ok(())) => {
                self.state = RelayState::Relaying;
                info!(session_id = %self.id, language, "Relay session ready");
                let ready = ServerControl::Ready {
                    language: language.to_string(),
                    session_id: self.id.clone(),
                };
                self.send_client(Frame::Text(ready.to_json())).await;
                early
            }
            Some(Err(e)) => {
                warn!(session_id = %self.id, kind = e.kind(), error = %e, "Relay configuration failed");
                self.send_error(&e.to_string()).await;
                self.state = RelayState::Failed;
                self.close();
                Vec::new()
            }
            None => {
                debug!(session_id = %self.id, "Client left while configuring");
                self.close();
                Vec::new()
            }
        }
    }

    /// Create the ephemeral session, open the upstream connection and push
    /// `session.update`. A completed handshake is the upstream's ready
    /// signal.
    async fn establish(&mut self, language: &str, include_domain_context: bool) -> Result<()> {
        let config = SessionConfig::new(language, include_domain_context, self.deps.params.clone())?;
        self.language = Some(config.language.clone());

        let ephemeral = tokio::time::timeout(
            self.deps.timeout,
            self.deps.upstream.create_ephemeral_session(&config.params),
        )
        .await
        .map_err(|_| TranslatorError::UpstreamUnavailable("realtime session creation timed out".into()))??;

        // At most one connect per session: the state machine never re-enters
        // Configuring.
        let connection = tokio::time::timeout(self.deps.timeout, self.deps.connector.connect(&ephemeral))
            .await
            .map_err(|_| TranslatorError::UpstreamUnavailable("realtime handshake timed out".into()))??;
        self.upstream = Some(connection);
        self.state = RelayState::Connected;

        let update = config.session_update().to_string();
        match &self.upstream {
            Some(upstream) => upstream.send(Frame::Text(update)).await,
            None => Err(TranslatorError::InternalRelay("upstream missing after connect".into())),
        }
    }

    /// Forward frames both ways until one side ends. Each direction is its
    /// own future, so a full channel on one side never holds up the other.
    async fn relay<S>(&mut self, client_rx: &mut S, early: Vec<Frame>)
    where
        S: Stream<Item = Frame> + Unpin,
    {
        let Some(upstream) = self.upstream.as_mut() else {
            warn!(session_id = %self.id, "Relaying without an upstream connection");
            self.state = RelayState::Failed;
            return;
        };
        let id = self.id.as_str();
        let client_tx = &self.client_tx;
        let sender = upstream.sender();

        let uplink = async {
            let mut frames = futures::stream::iter(early).chain(client_rx);
            let mut sent = 0u64;
            while let Some(frame) = frames.next().await {
                if let Err(e) = sender.send(frame).await {
                    warn!(session_id = %id, error = %e, "Upstream send failed");
                    return sent;
                }
                sent += 1;
            }
            debug!(session_id = %id, "Client closed");
            sent
        };

        let downlink = async {
            let mut delivered = 0u64;
            while let Some(frame) = upstream.recv().await {
                if client_tx.send(frame).await.is_err() {
                    debug!(session_id = %id, "Client writer gone");
                    return delivered;
                }
                delivered += 1;
            }
            info!(session_id = %id, "Upstream closed");
            delivered
        };

        tokio::select! {
            to_upstream = uplink => debug!(session_id = %id, to_upstream, "Relay ended by client side"),
            to_client = downlink => debug!(session_id = %id, to_client, "Relay ended by upstream side"),
        }
    }

    /// Release the upstream connection. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(upstream) = self.upstream.take() {
            upstream.close();
            debug!(session_id = %self.id, "Upstream connection closed");
        }
        if self.state != RelayState::Failed {
            self.state = RelayState::Closed;
        }
    }

    async fn send_error(&self, message: &str) {
        self.send_client(Frame::Text(ServerControl::error(message).to_json()))
            .await;
    }

    async fn send_client(&self, frame: Frame) {
        if self.client_tx.send(frame).await.is_err() {
            debug!(session_id = %self.id, "Dropping frame for departed client");
        }
    }
}
