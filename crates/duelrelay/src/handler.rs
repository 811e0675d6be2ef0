//! Per-connection handler: frame decoding and routing to the broker.
//!
//! Each accepted connection gets its own Tokio task running this handler,
//! plus a writer task that drains the connection's outbound channel into
//! the socket. The flow is:
//!   1. Register the outbound channel's writer
//!   2. Loop: receive frames → decode → identify or relay via the broker
//!   3. On close, error, or idle timeout: report the disconnect

use std::sync::Arc;

use duelrelay_broker::{BrokerError, BrokerHandle};
use duelrelay_protocol::{ClientFrame, Codec, ServerMessage};
use duelrelay_registry::ClientSender;
use duelrelay_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::server::ServerState;
use crate::DuelRelayError;

/// Drop guard that reports the connection's close to the broker.
///
/// Runs even if the handler panics. `Drop` is synchronous, so the
/// disconnect is sent from a fire-and-forget task.
struct ConnectionGuard {
    conn_id: ConnectionId,
    broker: BrokerHandle,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let broker = self.broker.clone();
        tokio::spawn(async move {
            if broker.disconnect(conn_id).await.is_err() {
                tracing::debug!(%conn_id, "broker gone, disconnect not reported");
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), DuelRelayError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let conn = Arc::new(conn);
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), Arc::clone(&state), rx));

    let guard = ConnectionGuard {
        conn_id,
        broker: state.broker.clone(),
    };

    let result = read_loop(&conn, &state, &tx).await;

    // Disconnect is queued behind every event this connection already sent.
    drop(guard);
    writer.abort();
    if let Err(e) = conn.close().await {
        tracing::trace!(%conn_id, error = %e, "close after disconnect");
    }

    result
}

/// Receives frames until the connection closes, errors, or goes idle.
async fn read_loop<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    tx: &ClientSender,
) -> Result<(), DuelRelayError> {
    let conn_id = conn.id();

    loop {
        let received = match state.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::info!(%conn_id, "idle timeout, closing");
                    return Ok(());
                }
            },
            None => conn.recv().await,
        };

        let data = match received {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Ok(());
            }
        };

        let frame: ClientFrame = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "malformed payload, ignoring");
                continue;
            }
        };

        match frame {
            ClientFrame::Identify(hello) => {
                let identity = hello.device_id.clone();
                match state.broker.identify(conn_id, hello, tx.clone()).await {
                    Ok(matched) => {
                        tracing::debug!(%conn_id, %identity, ?matched, "identified");
                    }
                    Err(BrokerError::Unavailable) => return Err(BrokerError::Unavailable.into()),
                    // The client already got its error reply.
                    Err(e) => {
                        tracing::debug!(%conn_id, %identity, error = %e, "identify rejected");
                    }
                }
            }
            ClientFrame::Relay(event) => {
                state.broker.relay(conn_id, event).await?;
            }
        }
    }
}

/// Encodes outbound messages and writes them to the socket, in order.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<C>>,
    mut rx: UnboundedReceiver<ServerMessage>,
) {
    let conn_id = conn.id();
    while let Some(msg) = rx.recv().await {
        let bytes = match state.codec.encode(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to encode outbound message");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, writer stopping");
            break;
        }
    }
}
