/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or accepting a TCP stream failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A TCP stream was accepted but never became a WebSocket.
    ///
    /// The listener itself is healthy; only this one client is dropped.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Returns `true` if the error only concerns a single client and the
    /// accept loop can keep going.
    pub fn is_per_client(&self) -> bool {
        matches!(self, Self::Handshake(_) | Self::ConnectionClosed(_))
    }
}
