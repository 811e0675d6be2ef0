//! Unified error type for the duelrelay server.

use duelrelay_broker::BrokerError;
use duelrelay_protocol::ProtocolError;
use duelrelay_registry::RegistryError;
use duelrelay_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuelRelayError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry invariant was broken.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The broker rejected a request or has stopped.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The environment held an invalid setting.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
