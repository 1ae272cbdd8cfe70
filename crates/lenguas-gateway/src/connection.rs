//! WebSocket connection lifecycle: adapts the axum socket to relay frames.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, Stream, StreamExt, future};
use tokio::sync::mpsc;
use tracing::{debug, info};

use lenguas_providers::Frame;

use crate::relay::RelaySession;
use crate::state::GatewayState;

/// Frames queued for a slow client before the relay stops reading upstream.
const CLIENT_CHANNEL_CAPACITY: usize = 256;

/// Handle a new downstream WebSocket until its relay session ends.
pub async fn handle_ws_connection(state: Arc<GatewayState>, ws: WebSocket) {
    let (mut ws_tx, ws_rx) = ws.split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(CLIENT_CHANNEL_CAPACITY);

    let mut session = RelaySession::new(state.relay_deps(), frame_tx);
    let session_id = session.id().to_string();
    state.register_session(&session_id, session.created_at()).await;
    info!(session_id = %session_id, "New WebSocket connection");

    #[cfg(feature = "metrics")]
    crate::metrics::record_session_open();

    // Writer: drains relay frames into the socket, then closes it.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if ws_tx.send(to_ws_message(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let final_state = session.run(client_frames(ws_rx)).await;

    // Dropping the session drops the frame sender, letting the writer flush
    // any pending error frame before closing.
    drop(session);
    let _ = send_task.await;

    state.unregister_session(&session_id).await;

    #[cfg(feature = "metrics")]
    crate::metrics::record_session_close(final_state);

    info!(session_id = %session_id, state = ?final_state, "WebSocket connection closed");
}

/// Data frames from the client. Ends at a close frame or a socket error.
fn client_frames<S>(ws_rx: S) -> impl Stream<Item = Frame> + Unpin
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    ws_rx
        .take_while(|msg| {
            let open = match msg {
                Ok(Message::Close(_)) => {
                    debug!("Client requested close");
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    debug!(%e, "WebSocket error");
                    false
                }
            };
            future::ready(open)
        })
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Frame::Text(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => Some(Frame::Binary(data)),
                // Axum answers pings itself.
                _ => None,
            })
        })
}

fn to_ws_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
    }
}
