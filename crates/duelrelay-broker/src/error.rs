//! Error types for the broker.

use duelrelay_protocol::{ClientIdentity, RoomId};
use duelrelay_registry::RegistryError;
use duelrelay_transport::ConnectionId;

/// Errors that can occur during broker operations.
///
/// None of these are fatal to the broker. Relay misses and stale rooms
/// are not errors at all; see [`RelayOutcome`](crate::RelayOutcome).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The identity is already registered by a live connection.
    #[error("identity {0} is already connected")]
    AlreadyConnected(ClientIdentity),

    /// The connection already identified itself.
    #[error("{0} is already identified as {1}")]
    AlreadyIdentified(ConnectionId, ClientIdentity),

    /// The room id generator produced an id that is still in use.
    #[error("room id {0} collided with a live room")]
    RoomIdCollision(RoomId),

    /// A registry invariant was broken.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The broker actor has stopped.
    #[error("broker is unavailable")]
    Unavailable,
}

/// A policy name from configuration didn't match any known value.
#[derive(Debug, thiserror::Error)]
#[error("unknown {what} `{value}` (expected {expected})")]
pub struct ParsePolicyError {
    what: &'static str,
    value: String,
    expected: &'static str,
}

impl ParsePolicyError {
    pub(crate) fn new(
        what: &'static str,
        value: &str,
        expected: &'static str,
    ) -> Self {
        Self {
            what,
            value: value.to_string(),
            expected,
        }
    }
}
