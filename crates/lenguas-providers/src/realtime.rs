//! Upstream realtime connection.
//!
//! A [`RealtimeConnection`] is the relay's handle on one upstream realtime
//! WebSocket: an outbound frame channel, an inbound frame channel, and a
//! cancellation token that tears both directions down. The socket itself is
//! driven by two background tasks, so neither direction waits on the other.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lenguas_core::error::{Result, TranslatorError};

use crate::{EphemeralSession, Frame};

/// Frames buffered per direction before the sender waits.
const CHANNEL_CAPACITY: usize = 256;

/// The relay's end of an upstream realtime connection.
#[derive(Debug)]
pub struct RealtimeConnection {
    sender: RealtimeSender,
    inbound: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
}

/// Outbound half of a [`RealtimeConnection`], usable while the inbound half
/// is being read.
#[derive(Debug, Clone)]
pub struct RealtimeSender {
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

impl RealtimeSender {
    /// Queue a frame for the upstream provider. Waits for channel space, but
    /// gives up as soon as the connection is closed.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(connection_closed()),
            sent = self.outbound.send(frame) => sent.map_err(|_| connection_closed()),
        }
    }
}

fn connection_closed() -> TranslatorError {
    TranslatorError::UpstreamUnavailable("realtime connection closed".into())
}

/// The provider's end of a [`RealtimeConnection`].
#[derive(Debug)]
pub struct RealtimePeer {
    /// Frames sent by the relay.
    pub from_relay: mpsc::Receiver<Frame>,
    /// Frames delivered to the relay.
    pub to_relay: mpsc::Sender<Frame>,
    /// Cancelled when either end closes.
    pub cancel: CancellationToken,
}

impl RealtimeConnection {
    /// Create a connected in-memory pair.
    pub fn pair(capacity: usize) -> (RealtimeConnection, RealtimePeer) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();

        let connection = RealtimeConnection {
            sender: RealtimeSender {
                outbound: outbound_tx,
                cancel: cancel.clone(),
            },
            inbound: inbound_rx,
            cancel: cancel.clone(),
        };
        let peer = RealtimePeer {
            from_relay: outbound_rx,
            to_relay: inbound_tx,
            cancel,
        };
        (connection, peer)
    }

    /// Queue a frame for the upstream provider.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.sender.send(frame).await
    }

    pub fn sender(&self) -> RealtimeSender {
        self.sender.clone()
    }

    /// Next frame from the provider, or `None` once the upstream side is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            frame = self.inbound.recv() => frame,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Close the connection. Consumes the handle, so a connection is closed
    /// at most once.
    pub fn close(self) {
        self.cancel.cancel();
    }
}

/// Opens upstream realtime connections.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Open the realtime connection authorized by `session`.
    async fn connect(&self, session: &EphemeralSession) -> Result<RealtimeConnection>;
}

/// Realtime connector over `tokio-tungstenite`.
pub struct TungsteniteConnector {
    api_key: String,
}

impl TungsteniteConnector {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    fn bearer<'a>(&'a self, session: &'a EphemeralSession) -> &'a str {
        session
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.api_key)
    }
}

#[async_trait]
impl RealtimeConnector for TungsteniteConnector {
    async fn connect(&self, session: &EphemeralSession) -> Result<RealtimeConnection> {
        let mut request = session
            .connection_uri
            .as_str()
            .into_client_request()
            .map_err(|e| TranslatorError::UpstreamUnavailable(format!("invalid realtime URI: {e}")))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.bearer(session)))
            .map_err(|_| TranslatorError::UpstreamAuth("credential is not a valid header".into()))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_handshake_error)?;

        info!(session_id = %session.session_id, "Upstream realtime connection established");

        let (connection, peer) = RealtimeConnection::pair(CHANNEL_CAPACITY);
        let (ws_tx, ws_rx) = ws_stream.split();

        let RealtimePeer {
            from_relay,
            to_relay,
            cancel,
        } = peer;

        let sid = session.session_id.clone();
        tokio::spawn(outbound_loop(from_relay, ws_tx, cancel.clone(), sid.clone()));
        tokio::spawn(inbound_loop(ws_rx, to_relay, cancel, sid));

        Ok(connection)
    }
}

fn map_handshake_error(err: tokio_tungstenite::tungstenite::Error) -> TranslatorError {
    use tokio_tungstenite::tungstenite::Error;
    match err {
        Error::Http(response)
            if response.status() == 401 || response.status() == 403 =>
        {
            TranslatorError::UpstreamAuth(format!("realtime handshake refused ({})", response.status()))
        }
        other => TranslatorError::UpstreamUnavailable(format!("realtime handshake failed: {other}")),
    }
}

fn to_ws_message(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Binary(data) => WsMessage::Binary(data),
    }
}

/// Relay → provider. Sends a close frame once cancelled or once the relay
/// drops its sender.
async fn outbound_loop<S>(
    mut rx: mpsc::Receiver<Frame>,
    mut ws_tx: S,
    cancel: CancellationToken,
    session_id: String,
) where
    S: futures::Sink<WsMessage> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if ws_tx.send(to_ws_message(frame)).await.is_err() {
                        warn!(session_id = %session_id, "Upstream send failed, closing");
                        cancel.cancel();
                        return;
                    }
                }
                None => break,
            },
        }
    }

    let _ = ws_tx.send(WsMessage::Close(None)).await;
    cancel.cancel();
    debug!(session_id = %session_id, "Upstream outbound loop terminated");
}

/// Provider → relay.
async fn inbound_loop<S>(
    mut ws_rx: S,
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    session_id: String,
) where
    S: futures::Stream<Item = std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = ws_rx.next() => msg,
        };

        let frame = match msg {
            Some(Ok(WsMessage::Text(text))) => Frame::Text(text.as_str().to_owned()),
            Some(Ok(WsMessage::Binary(data))) => Frame::Binary(data),
            Some(Ok(WsMessage::Close(frame))) => {
                info!(session_id = %session_id, close_frame = ?frame, "Upstream closed realtime connection");
                break;
            }
            // Ping/pong are answered by tungstenite.
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "Upstream realtime error");
                break;
            }
            None => break,
        };

        if tx.send(frame).await.is_err() {
            debug!(session_id = %session_id, "Relay dropped inbound receiver");
            break;
        }
    }

    cancel.cancel();
    debug!(session_id = %session_id, "Upstream inbound loop terminated");
}
