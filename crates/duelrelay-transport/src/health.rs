//! Plain-HTTP health check served on the WebSocket port.
//!
//! Load balancers and uptime checkers hit `GET /` without an upgrade
//! header. Before handing a fresh TCP stream to the WebSocket handshake we
//! peek at the request head; non-upgrade requests get a tiny static
//! response and the stream is closed.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::TransportError;

/// Body returned by the health route.
pub const HEALTH_BODY: &str = "WebSocket server is running";

/// Largest request head we look at. Anything longer is left to the
/// WebSocket handshake to reject.
const MAX_HEAD: usize = 4096;

/// Delay between peeks while a request head is still arriving.
const PEEK_RETRY: Duration = Duration::from_millis(10);

/// What a freshly accepted stream is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    /// A WebSocket upgrade (or something we can't classify yet).
    Upgrade,
    /// A plain HTTP request for the health route.
    Health,
    /// A plain HTTP request for any other path.
    NotFound,
}

/// Peeks at the request head without consuming it.
///
/// A head split over several TCP segments is peeked again until it ends,
/// fills `MAX_HEAD`, or the peer closes. The caller bounds the wait.
pub(crate) async fn probe(stream: &TcpStream) -> Result<Probe, TransportError> {
    let mut buf = vec![0u8; MAX_HEAD];
    loop {
        let n = stream
            .peek(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        let head = &buf[..n];
        if n == 0 || n == MAX_HEAD || head_complete(head) {
            return Ok(classify(head));
        }
        // peek returns at once while bytes are buffered; back off until
        // more of the head arrives.
        tokio::time::sleep(PEEK_RETRY).await;
    }
}

/// `true` once the blank line ending the request head has arrived.
fn head_complete(head: &[u8]) -> bool {
    head.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Classifies a (possibly partial) HTTP request head.
pub(crate) fn classify(head: &[u8]) -> Probe {
    // Incomplete head: let tungstenite read the rest and decide.
    if !head_complete(head) {
        return Probe::Upgrade;
    }
    let text = String::from_utf8_lossy(head);

    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();

    let wants_upgrade = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .any(|(name, value)| {
            name.trim().eq_ignore_ascii_case("upgrade")
                && value.to_ascii_lowercase().contains("websocket")
        });
    if wants_upgrade {
        return Probe::Upgrade;
    }

    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET" | "HEAD"), Some("/")) => Probe::Health,
        _ => Probe::NotFound,
    }
}

/// Writes the static response for a non-upgrade request and closes.
pub(crate) async fn respond(
    mut stream: TcpStream,
    probe: Probe,
) -> Result<(), TransportError> {
    // Consume the head we peeked so the peer sees an orderly close.
    let mut buf = vec![0u8; MAX_HEAD];
    let _ = stream.read(&mut buf).await;

    let (status, body) = match probe {
        Probe::Health => ("200 OK", HEALTH_BODY),
        _ => ("404 Not Found", "Not Found"),
    };
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );

    stream
        .write_all(response.as_bytes())
        .await
        .map_err(TransportError::SendFailed)?;
    stream.shutdown().await.map_err(TransportError::SendFailed)?;
    Ok(())
}
