//! WebSocket session loop.
//!
//! One session owns one socket and one outbound queue. Every namespace the
//! client joins registers a separate [`Connection`] that shares the queue,
//! so deliveries from all namespaces leave the socket in the order the
//! [`crate::domain::BroadcastEngine`] enqueued them.

use std::sync::Arc;

use axum::extract::ws::{Message as WsFrame, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::joined::JoinedNamespaces;
use super::messages::{ClientFrame, ServerFrame};
use crate::domain::{Connection, ConnectionHandle, NamespacePath};
use crate::error::RelayError;
use crate::service::RelayService;

/// Runs the read/write loop for a single WebSocket.
///
/// - Reads client frames and applies them to `relay`.
/// - Forwards queued deliveries for joined namespaces to the client.
/// - On close, disconnects every namespace connection the socket held.
pub async fn run_session(socket: WebSocket, relay: Arc<RelayService>, outbound_capacity: usize) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::channel(outbound_capacity);
    let mut joined = JoinedNamespaces::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(WsFrame::Text(text))) => {
                        let reply = handle_text(&relay, &handle, &mut joined, text.as_str()).await;
                        if let Some(json) = reply.as_ref().and_then(ServerFrame::to_json)
                            && ws_tx.send(WsFrame::text(json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(WsFrame::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
            delivery = outbound.recv() => {
                let Some(delivery) = delivery else { break };
                if !joined.accepts(&delivery) {
                    continue;
                }
                let Some(json) = ServerFrame::from_delivery(&delivery).to_json() else {
                    continue;
                };
                if ws_tx.send(WsFrame::text(json)).await.is_err() {
                    break;
                }
            }
        }
    }

    for id in joined.drain() {
        if let Err(e) = relay.disconnect(id).await {
            tracing::debug!(connection_id = %id, error = %e, "connection already gone at session close");
        }
    }
    tracing::debug!("ws session closed");
}

/// Applies one client text frame, returning the frame to send back, if any.
async fn handle_text(
    relay: &RelayService,
    handle: &ConnectionHandle,
    joined: &mut JoinedNamespaces,
    text: &str,
) -> Option<ServerFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => return Some(ServerFrame::error(None, 400, format!("malformed frame: {e}"))),
    };

    match frame {
        ClientFrame::Connect { nsp } => {
            let connection = Connection::new(handle.clone());
            let id = connection.id();
            // Joined before connect handlers run so their deliveries pass
            // the session filter.
            if !joined.join(nsp.clone(), id) {
                return Some(ServerFrame::error(
                    Some(nsp),
                    409,
                    "already connected to namespace",
                ));
            }
            match relay.connect(connection, &nsp).await {
                Ok(id) => Some(ServerFrame::Connected { nsp, id }),
                Err(e) => {
                    joined.leave(&nsp);
                    Some(error_frame(nsp, &e))
                }
            }
        }
        ClientFrame::Event { nsp, event, data } => {
            let Some(id) = joined.connection_in(&nsp) else {
                return Some(ServerFrame::error(Some(nsp), 404, "not connected to namespace"));
            };
            match relay.handle_event(id, &event, data).await {
                Ok(_) => None,
                Err(e) => Some(error_frame(nsp, &e)),
            }
        }
        ClientFrame::Disconnect { nsp } => {
            let Some(id) = joined.leave(&nsp) else {
                return Some(ServerFrame::error(Some(nsp), 404, "not connected to namespace"));
            };
            if let Err(e) = relay.disconnect(id).await {
                tracing::debug!(connection_id = %id, error = %e, "disconnect raced with removal");
            }
            Some(ServerFrame::Disconnected { nsp })
        }
    }
}

fn error_frame(nsp: NamespacePath, err: &RelayError) -> ServerFrame {
    ServerFrame::error(Some(nsp), err.status_code().as_u16(), err.to_string())
}
