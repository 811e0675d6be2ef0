//! Error types for the registry.

use duelrelay_protocol::ClientIdentity;
use duelrelay_transport::ConnectionId;

/// Errors returned by [`ConnectionRegistry`](crate::ConnectionRegistry).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The identity already has a live entry.
    #[error("identity {0} is already registered")]
    DuplicateIdentity(ClientIdentity),

    /// The connection already owns a different identity.
    #[error("{0} is already registered as {1}")]
    ConnectionBound(ConnectionId, ClientIdentity),

    /// No entry exists for the identity. Callers treat this as
    /// "peer is gone".
    #[error("identity {0} is not registered")]
    NotFound(ClientIdentity),
}
