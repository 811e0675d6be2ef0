//! The matchmaking and relay state machine.
//!
//! [`Broker`] owns the waiting pool, the room table, and the connection
//! registry, and exposes one method per inbound event. It is synchronous
//! and does no I/O: outbound messages are queued on unbounded channels,
//! so a slow or dead peer never stalls the caller. The actor in
//! [`actor`](crate::actor) serializes access to it.
//!
//! Per identity:
//!
//! ```text
//! UNIDENTIFIED ──identify──→ WAITING ──peer arrives──→ PAIRED
//!      │                        │                        │
//!      └────────────────────disconnect──────────────────┴──→ TERMINATED
//! ```

use std::collections::HashMap;
use std::time::Instant;

use duelrelay_protocol::{
    ClientIdentity, Identify, RelayEvent, RoomId, ServerMessage, StatusMessage,
};
use duelrelay_registry::{ClientChannel, ClientSender, ConnectionRegistry, RegistryError};
use duelrelay_transport::ConnectionId;

use crate::room::{RoomIdSource, random_room_id};
use crate::{BrokerConfig, BrokerError, Room, TeardownPolicy, WaitingEntry, WaitingPool};

/// Result of a successful identify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matched {
    /// Queued; nobody else was waiting.
    Waiting,
    /// Paired with the oldest waiting client.
    Paired {
        room_id: RoomId,
        opponent: ClientIdentity,
    },
}

/// What became of a relayed event. Never an error: misses are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Routed within `room_id`. `recipients` counts successful queueing;
    /// zero means the peer was already gone.
    Delivered { room_id: RoomId, recipients: usize },
    /// The sending connection is not in a room.
    NotPaired,
    /// The sender still points at a room that no longer exists.
    RoomGone,
}

/// What a disconnect tore down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The connection never identified (or was already reset).
    Unidentified,
    /// The identity was waiting and left the pool.
    LeftQueue(ClientIdentity),
    /// The identity was paired.
    LeftRoom {
        identity: ClientIdentity,
        room_id: RoomId,
        /// `true` if the room was deleted as part of this disconnect.
        room_closed: bool,
    },
}

/// Where an identity is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPhase {
    Unidentified,
    Waiting,
    Paired(RoomId),
}

/// Counters for monitoring and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    pub waiting: usize,
    pub rooms: usize,
    pub registered: usize,
}

/// Matchmaking and relay state for every connected client.
pub struct Broker {
    config: BrokerConfig,
    registry: ConnectionRegistry,
    waiting: WaitingPool,
    rooms: HashMap<RoomId, Room>,
    /// Maps each paired identity to its room. An identity is in at most
    /// one room, and never in both this map and the waiting pool.
    member_rooms: HashMap<ClientIdentity, RoomId>,
    next_room_id: RoomIdSource,
}

impl Broker {
    /// Creates a broker with random room ids.
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_room_ids(config, Box::new(random_room_id))
    }

    /// Creates a broker that takes room ids from `source`.
    pub fn with_room_ids(config: BrokerConfig, source: RoomIdSource) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            waiting: WaitingPool::new(),
            rooms: HashMap::new(),
            member_rooms: HashMap::new(),
            next_room_id: source,
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Handles an identify frame from `conn`.
    ///
    /// Rejections are reported to the client as a `status:"error"` reply
    /// on `sender` and returned as errors; the connection stays
    /// unidentified and may retry.
    ///
    /// # Errors
    /// - [`BrokerError::AlreadyIdentified`]: `conn` already owns an
    ///   identity.
    /// - [`BrokerError::AlreadyConnected`]: another live connection owns
    ///   this identity.
    /// - [`BrokerError::RoomIdCollision`]: the id generator repeated a
    ///   live room id. State is rolled back.
    pub fn identify(
        &mut self,
        conn: ConnectionId,
        hello: Identify,
        sender: ClientSender,
    ) -> Result<Matched, BrokerError> {
        let channel = ClientChannel::new(conn, sender);

        if let Some(bound) = self.registry.identity_of(conn) {
            tracing::warn!(%conn, identity = %bound, "identify on identified connection");
            channel.send(ServerMessage::error("Already identified."));
            return Err(BrokerError::AlreadyIdentified(conn, bound.clone()));
        }

        let Identify {
            device_id: identity,
            name,
        } = hello;

        match self.registry.register(identity.clone(), channel.clone()) {
            Ok(()) => {}
            Err(RegistryError::DuplicateIdentity(identity)) => {
                tracing::warn!(%conn, %identity, "identity already connected");
                channel.send(ServerMessage::error("Already connected."));
                return Err(BrokerError::AlreadyConnected(identity));
            }
            Err(e) => return Err(e.into()),
        }

        let Some(opponent) = self.waiting.dequeue() else {
            self.waiting
                .enqueue(WaitingEntry::new(identity.clone(), name.clone()));
            channel.send(ServerMessage::waiting(identity.clone(), name));
            tracing::info!(%conn, %identity, "waiting for opponent");
            return Ok(Matched::Waiting);
        };

        let room_id = (self.next_room_id)();
        if self.rooms.contains_key(&room_id) {
            tracing::error!(%room_id, "room id collision, refusing to merge rooms");
            self.waiting.restore(opponent);
            self.registry.unregister(&identity);
            channel.send(ServerMessage::error("Room allocation failed."));
            return Err(BrokerError::RoomIdCollision(room_id));
        }

        let room = Room::new(room_id.clone(), opponent.identity.clone(), identity.clone());
        self.member_rooms.insert(opponent.identity.clone(), room_id.clone());
        self.member_rooms.insert(identity.clone(), room_id.clone());
        self.rooms.insert(room_id.clone(), room);

        // Each side sees itself first and its opponent second.
        self.registry.deliver(
            &opponent.identity,
            connected(&room_id, &opponent.identity, &opponent.name, &identity, &name),
        );
        channel.send(connected(
            &room_id,
            &identity,
            &name,
            &opponent.identity,
            &opponent.name,
        ));

        tracing::info!(
            %room_id,
            first = %opponent.identity,
            second = %identity,
            "room created"
        );

        Ok(Matched::Paired {
            room_id,
            opponent: opponent.identity,
        })
    }

    /// Relays a game event from `conn` to its room.
    ///
    /// The event is re-tagged with the identity bound to `conn`, whatever
    /// `deviceId` the client wrote. Dropped silently if `conn` isn't
    /// paired or its room is gone.
    pub fn relay(&self, conn: ConnectionId, event: RelayEvent) -> RelayOutcome {
        let Some(sender) = self.registry.identity_of(conn) else {
            return RelayOutcome::NotPaired;
        };
        let Some(room_id) = self.member_rooms.get(sender) else {
            return RelayOutcome::NotPaired;
        };
        let Some(room) = self.rooms.get(room_id) else {
            return RelayOutcome::RoomGone;
        };

        if event.sender != *sender {
            tracing::debug!(
                %sender,
                claimed = %event.sender,
                "relay deviceId does not match connection, re-tagging"
            );
        }

        let kind = event.kind();
        let scope = self.config.relay.scope_for(kind);
        let tagged = event.tagged(sender);

        let mut recipients = 0;
        for member in room.members() {
            if member == sender && !scope.includes_sender() {
                continue;
            }
            if !self.occupies(member, room_id) {
                continue;
            }
            if self
                .registry
                .deliver(member, ServerMessage::Relay(tagged.clone()))
            {
                recipients += 1;
            } else {
                tracing::debug!(%room_id, %member, %kind, "peer unavailable, dropping");
            }
        }

        tracing::debug!(%room_id, %sender, %kind, recipients, "relayed");
        RelayOutcome::Delivered {
            room_id: room_id.clone(),
            recipients,
        }
    }

    /// Handles the close of `conn`.
    ///
    /// Applies the configured [`TeardownPolicy`] if the identity was
    /// paired. Regardless of phase, the identity is removed from the
    /// registry and purged from the waiting pool.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Departure {
        let Some(identity) = self.registry.identity_of(conn).cloned() else {
            tracing::debug!(%conn, "unidentified connection closed");
            return Departure::Unidentified;
        };

        let departure = match self.member_rooms.get(&identity).cloned() {
            Some(room_id) => {
                let room_closed = match self.config.teardown {
                    TeardownPolicy::RoomCollapse => self.collapse_room(&room_id, &identity),
                    TeardownPolicy::PartnerNotify => self.leave_room(&room_id, &identity),
                };
                Departure::LeftRoom {
                    identity: identity.clone(),
                    room_id,
                    room_closed,
                }
            }
            None => Departure::LeftQueue(identity.clone()),
        };

        self.registry.unregister(&identity);
        self.waiting.remove(&identity);
        self.member_rooms.remove(&identity);

        tracing::info!(%conn, %identity, "client disconnected");
        departure
    }

    /// Evicts clients that have waited longer than the configured wait
    /// timeout. Each gets a `status:"timeout"` message and returns to
    /// unidentified. No-op when the timeout is disabled.
    pub fn expire_waiting(&mut self, now: Instant) -> Vec<ClientIdentity> {
        let Some(timeout) = self.config.wait_timeout else {
            return Vec::new();
        };

        let expired = self.waiting.drain_expired(now, timeout);
        let mut evicted = Vec::with_capacity(expired.len());
        for entry in expired {
            self.registry
                .deliver(&entry.identity, ServerMessage::timeout(entry.identity.clone()));
            self.registry.unregister(&entry.identity);
            tracing::warn!(identity = %entry.identity, "wait timeout, evicted from pool");
            evicted.push(entry.identity);
        }
        evicted
    }

    /// Returns where `identity` currently is.
    pub fn phase(&self, identity: &ClientIdentity) -> ClientPhase {
        if let Some(room_id) = self.member_rooms.get(identity) {
            return ClientPhase::Paired(room_id.clone());
        }
        if self.waiting.contains(identity) {
            return ClientPhase::Waiting;
        }
        ClientPhase::Unidentified
    }

    /// Returns the identity bound to `conn`, if any.
    pub fn identity_of(&self, conn: ConnectionId) -> Option<&ClientIdentity> {
        self.registry.identity_of(conn)
    }

    /// Returns a live room by id.
    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Returns the waiting identities, oldest first.
    pub fn waiting(&self) -> impl Iterator<Item = &ClientIdentity> {
        self.waiting.iter().map(|e| &e.identity)
    }

    /// Returns current counters.
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            waiting: self.waiting.len(),
            rooms: self.rooms.len(),
            registered: self.registry.len(),
        }
    }

    /// `true` if `identity` is still seated in `room_id`. A member who left
    /// under partner-notify may have come back as a fresh client.
    fn occupies(&self, identity: &ClientIdentity, room_id: &RoomId) -> bool {
        self.member_rooms.get(identity) == Some(room_id)
    }

    /// Room-collapse: tell every member, unregister every member, delete
    /// the room.
    fn collapse_room(&mut self, room_id: &RoomId, leaver: &ClientIdentity) -> bool {
        let Some(room) = self.rooms.remove(room_id) else {
            return false;
        };

        for member in room.members() {
            self.registry.deliver(
                member,
                ServerMessage::room_deleted(room_id.clone(), leaver.clone()),
            );
            self.registry.unregister(member);
            self.member_rooms.remove(member);
        }

        tracing::info!(room_id = %room.id(), %leaver, "room deleted");
        true
    }

    /// Partner-notify: tell the remaining peer, drop only the leaver. The
    /// room goes away once no member still points at it.
    fn leave_room(&mut self, room_id: &RoomId, leaver: &ClientIdentity) -> bool {
        self.member_rooms.remove(leaver);

        let still_occupied = match self.rooms.get(room_id) {
            Some(room) => {
                for member in room.members() {
                    if member != leaver && self.occupies(member, room_id) {
                        self.registry
                            .deliver(member, ServerMessage::player_disconnected(leaver.clone()));
                    }
                }
                room.members().iter().any(|m| self.occupies(m, room_id))
            }
            None => return false,
        };

        if still_occupied {
            tracing::info!(%room_id, %leaver, "player left room, peer notified");
            return false;
        }

        self.rooms.remove(room_id);
        tracing::info!(%room_id, "room deleted after last member left");
        true
    }
}

/// Builds the `connected` message from `me`'s point of view.
fn connected(
    room_id: &RoomId,
    me: &ClientIdentity,
    my_name: &Option<String>,
    opponent: &ClientIdentity,
    opponent_name: &Option<String>,
) -> ServerMessage {
    ServerMessage::Status(StatusMessage::Connected {
        room_id: room_id.clone(),
        device_id: me.clone(),
        opponent_device_id: opponent.clone(),
        device_id_name: my_name.clone(),
        opponent_device_id_name: opponent_name.clone(),
    })
}
