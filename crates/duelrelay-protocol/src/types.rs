//! Core protocol types for duelrelay's wire format.
//!
//! Every frame is a JSON object. Client frames carry a `type`
//! discriminator, except the very first one (the identify frame), which
//! has none. Server messages use `status` for matchmaking replies and
//! `type` for notices and relayed events.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The externally supplied token naming a client (its `deviceId`).
///
/// Opaque to the broker: it is only compared for equality against
/// currently registered identities, never validated against history.
///
/// `#[serde(transparent)]` keeps it a bare JSON string on the wire.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Wraps a raw device id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw device id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unique identifier for a room (one two-player match).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wraps a raw room id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw room id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Client → broker
// ---------------------------------------------------------------------------

/// The identify frame: `{deviceId, name?}` with no `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identify {
    /// Who the client claims to be.
    #[serde(rename = "deviceId")]
    pub device_id: ClientIdentity,

    /// Optional display name shown to the opponent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Identify {
    /// Creates an identify frame without a display name.
    pub fn new(device_id: impl Into<ClientIdentity>) -> Self {
        Self {
            device_id: device_id.into(),
            name: None,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// The kind of a relayed game event, without its payload.
///
/// Used as the key for per-kind relay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PositionUpdate,
    IsFirstAttack,
    IsSecondAttack,
    IsShield,
    ScoreAndStrength,
    Local,
    Opponent,
}

impl EventKind {
    /// Every kind the broker knows how to relay.
    pub const ALL: [EventKind; 7] = [
        EventKind::PositionUpdate,
        EventKind::IsFirstAttack,
        EventKind::IsSecondAttack,
        EventKind::IsShield,
        EventKind::ScoreAndStrength,
        EventKind::Local,
        EventKind::Opponent,
    ];

    /// The `type` discriminator used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PositionUpdate => "positionUpdate",
            Self::IsFirstAttack => "isFirstAttack",
            Self::IsSecondAttack => "isSecondAttack",
            Self::IsShield => "isShield",
            Self::ScoreAndStrength => "scoreAndStrength",
            Self::Local => "local",
            Self::Opponent => "opponent",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A symmetric game event, discriminated by its `type` field.
///
/// Payload values are kept as raw JSON: the broker routes them and never
/// interprets them. A missing field is still a decode error, so a frame
/// that names a type must carry that type's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GameEvent {
    PositionUpdate {
        new_position: Value,
    },
    IsFirstAttack {
        is_first_attack: Value,
    },
    IsSecondAttack {
        is_second_attack: Value,
    },
    IsShield {
        is_shield: Value,
    },
    ScoreAndStrength {
        score: Value,
        strength: Value,
        is_game_over: Value,
        opponent_id: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remote_strength: Option<Value>,
    },
    Local {
        score: Value,
        strength: Value,
    },
    Opponent {
        score: Value,
        strength: Value,
    },
}

impl GameEvent {
    /// Returns the payload-free kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PositionUpdate { .. } => EventKind::PositionUpdate,
            Self::IsFirstAttack { .. } => EventKind::IsFirstAttack,
            Self::IsSecondAttack { .. } => EventKind::IsSecondAttack,
            Self::IsShield { .. } => EventKind::IsShield,
            Self::ScoreAndStrength { .. } => EventKind::ScoreAndStrength,
            Self::Local { .. } => EventKind::Local,
            Self::Opponent { .. } => EventKind::Opponent,
        }
    }
}

/// A game event tagged with the identity of the client that sent it.
///
/// Inbound, `deviceId` is whatever the client wrote; the broker replaces
/// it with the identity bound to the sending connection before relaying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    #[serde(rename = "deviceId")]
    pub sender: ClientIdentity,

    #[serde(flatten)]
    pub event: GameEvent,
}

impl RelayEvent {
    /// Returns the kind of the wrapped event.
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Returns a copy re-tagged with `sender`.
    pub fn tagged(&self, sender: &ClientIdentity) -> Self {
        Self {
            sender: sender.clone(),
            event: self.event.clone(),
        }
    }
}

/// Any frame a client may send.
///
/// Dispatch is on the presence of `type`: absent means identify, present
/// means a game event. An unknown `type` is a decode error rather than
/// falling back to identify.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Identify(Identify),
    Relay(RelayEvent),
}

impl<'de> Deserialize<'de> for ClientFrame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if !value.is_object() {
            return Err(D::Error::custom("frame must be a JSON object"));
        }

        if value.get("type").is_some() {
            return RelayEvent::deserialize(value)
                .map(ClientFrame::Relay)
                .map_err(D::Error::custom);
        }

        let identify = Identify::deserialize(value).map_err(D::Error::custom)?;
        if identify.device_id.as_str().is_empty() {
            return Err(D::Error::custom("deviceId must not be empty"));
        }
        Ok(ClientFrame::Identify(identify))
    }
}

// ---------------------------------------------------------------------------
// Broker → client
// ---------------------------------------------------------------------------

/// Matchmaking replies, discriminated by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "status",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum StatusMessage {
    /// The client is queued with no opponent yet.
    Waiting {
        message: String,
        waiting_device_id: ClientIdentity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// The client was paired. Ids are from the receiver's point of view.
    Connected {
        room_id: RoomId,
        device_id: ClientIdentity,
        opponent_device_id: ClientIdentity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_id_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        opponent_device_id_name: Option<String>,
    },

    /// A request was rejected; the connection stays open.
    Error { message: String },

    /// The client waited longer than the configured wait timeout.
    Timeout {
        message: String,
        waiting_device_id: ClientIdentity,
    },
}

/// Teardown notices, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Notice {
    /// Partner-notify teardown: the opponent left.
    PlayerDisconnected { device_id: ClientIdentity },

    /// Room-collapse teardown: the room no longer exists.
    RoomDeleted {
        room_id: RoomId,
        disconnected_device_id: ClientIdentity,
        is_game_over: bool,
    },
}

/// Anything the broker sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Status(StatusMessage),
    Notice(Notice),
    Relay(RelayEvent),
}

impl ServerMessage {
    /// `{status:"waiting"}` acknowledgement for a queued client.
    pub fn waiting(identity: ClientIdentity, name: Option<String>) -> Self {
        Self::Status(StatusMessage::Waiting {
            message: "Waiting for opponent...".to_string(),
            waiting_device_id: identity,
            name,
        })
    }

    /// `{status:"error"}` with a human-readable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Status(StatusMessage::Error {
            message: message.into(),
        })
    }

    /// `{status:"timeout"}` for a client evicted from the waiting pool.
    pub fn timeout(identity: ClientIdentity) -> Self {
        Self::Status(StatusMessage::Timeout {
            message: "Timed out waiting for opponent.".to_string(),
            waiting_device_id: identity,
        })
    }

    /// `{type:"playerDisconnected"}` naming the client that left.
    pub fn player_disconnected(identity: ClientIdentity) -> Self {
        Self::Notice(Notice::PlayerDisconnected {
            device_id: identity,
        })
    }

    /// `{type:"roomDeleted"}` for a collapsed room.
    pub fn room_deleted(room_id: RoomId, leaver: ClientIdentity) -> Self {
        Self::Notice(Notice::RoomDeleted {
            room_id,
            disconnected_device_id: leaver,
            is_game_over: true,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
