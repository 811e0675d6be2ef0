//! The registry itself: identity ↔ outbound channel.
//!
//! # Concurrency note
//!
//! `ConnectionRegistry` is NOT thread-safe by itself. It is owned by the
//! broker actor, which is the single writer for all matchmaking state, so
//! a plain `HashMap` is enough.

use std::collections::HashMap;

use duelrelay_protocol::{ClientIdentity, ServerMessage};
use duelrelay_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::RegistryError;

/// Outbound channel for one connection.
///
/// Unbounded so delivery never waits on a slow peer; the connection's
/// writer task drains it into the socket.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

/// A registered connection: which socket, and how to reach it.
#[derive(Debug, Clone)]
pub struct ClientChannel {
    /// The transport connection that owns the identity.
    pub conn: ConnectionId,
    /// Where outbound messages for this identity go.
    pub sender: ClientSender,
}

impl ClientChannel {
    /// Creates a channel entry for `conn`.
    pub fn new(conn: ConnectionId, sender: ClientSender) -> Self {
        Self { conn, sender }
    }

    /// Queues a message for delivery. Returns `false` if the connection's
    /// writer has already gone away.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.sender.send(msg).is_ok()
    }
}

/// Maps live identities to their connections.
///
/// Two maps are kept in sync: identity → channel for targeted delivery,
/// and connection → identity so inbound events (which only know their
/// connection) can find who sent them.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    channels: HashMap<ClientIdentity, ClientChannel>,
    identities: HashMap<ConnectionId, ClientIdentity>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `identity` as owned by `channel`.
    ///
    /// # Errors
    /// - [`RegistryError::DuplicateIdentity`] if the identity already has a
    ///   live entry.
    /// - [`RegistryError::ConnectionBound`] if the connection already owns
    ///   another identity.
    pub fn register(
        &mut self,
        identity: ClientIdentity,
        channel: ClientChannel,
    ) -> Result<(), RegistryError> {
        if self.channels.contains_key(&identity) {
            return Err(RegistryError::DuplicateIdentity(identity));
        }
        if let Some(bound) = self.identities.get(&channel.conn) {
            return Err(RegistryError::ConnectionBound(
                channel.conn,
                bound.clone(),
            ));
        }

        tracing::debug!(%identity, conn = %channel.conn, "identity registered");
        self.identities.insert(channel.conn, identity.clone());
        self.channels.insert(identity, channel);
        Ok(())
    }

    /// Looks up the channel for `identity`.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if the identity isn't registered.
    pub fn lookup(
        &self,
        identity: &ClientIdentity,
    ) -> Result<&ClientChannel, RegistryError> {
        self.channels
            .get(identity)
            .ok_or_else(|| RegistryError::NotFound(identity.clone()))
    }

    /// Removes the entry for `identity`, returning it if there was one.
    ///
    /// Idempotent: unregistering an absent identity is a no-op.
    pub fn unregister(&mut self, identity: &ClientIdentity) -> Option<ClientChannel> {
        let channel = self.channels.remove(identity)?;
        self.identities.remove(&channel.conn);
        tracing::debug!(%identity, conn = %channel.conn, "identity unregistered");
        Some(channel)
    }

    /// Returns the identity owned by `conn`, if it has identified.
    pub fn identity_of(&self, conn: ConnectionId) -> Option<&ClientIdentity> {
        self.identities.get(&conn)
    }

    /// Best-effort delivery to `identity`.
    ///
    /// Returns `false` when the identity is unknown or its writer is gone;
    /// callers treat both as "peer unavailable" and move on.
    pub fn deliver(&self, identity: &ClientIdentity, msg: ServerMessage) -> bool {
        match self.lookup(identity) {
            Ok(channel) => channel.send(msg),
            Err(_) => false,
        }
    }

    /// Returns `true` if `identity` has a live entry.
    pub fn contains(&self, identity: &ClientIdentity) -> bool {
        self.channels.contains_key(identity)
    }

    /// Returns the number of registered identities.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
