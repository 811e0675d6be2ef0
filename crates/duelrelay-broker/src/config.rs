//! Broker configuration and the two policy knobs.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use duelrelay_protocol::EventKind;

use crate::ParsePolicyError;

/// Default capacity of the broker's command channel.
pub const DEFAULT_CHANNEL_SIZE: usize = 1024;

// ---------------------------------------------------------------------------
// TeardownPolicy
// ---------------------------------------------------------------------------

/// What happens to a room when one of its members disconnects.
///
/// Applied uniformly to every room; the broker never mixes the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeardownPolicy {
    /// Notify every member with `roomDeleted`, unregister every member,
    /// delete the room at once. Survivors go back to unidentified.
    #[default]
    RoomCollapse,

    /// Tell only the remaining peer `playerDisconnected` and unregister
    /// only the leaver. The room lingers until its last member leaves.
    PartnerNotify,
}

impl TeardownPolicy {
    fn as_str(self) -> &'static str {
        match self {
            Self::RoomCollapse => "room-collapse",
            Self::PartnerNotify => "partner-notify",
        }
    }
}

impl fmt::Display for TeardownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeardownPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "room-collapse" => Ok(Self::RoomCollapse),
            "partner-notify" => Ok(Self::PartnerNotify),
            _ => Err(ParsePolicyError::new(
                "teardown policy",
                s,
                "room-collapse | partner-notify",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// RelayScope / RelayPolicy
// ---------------------------------------------------------------------------

/// Which room members receive a relayed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayScope {
    /// Everyone in the room except the sender.
    #[default]
    PeersOnly,
    /// Everyone in the room, the sender included (an idempotent echo).
    AllMembers,
}

impl RelayScope {
    /// Returns `true` if the sender gets its own event back.
    pub fn includes_sender(self) -> bool {
        matches!(self, Self::AllMembers)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::PeersOnly => "peers-only",
            Self::AllMembers => "all-members",
        }
    }
}

impl fmt::Display for RelayScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayScope {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "peers-only" => Ok(Self::PeersOnly),
            "all-members" => Ok(Self::AllMembers),
            _ => Err(ParsePolicyError::new(
                "relay scope",
                s,
                "peers-only | all-members",
            )),
        }
    }
}

/// Relay scope per event kind.
///
/// ```rust
/// use duelrelay_broker::{RelayPolicy, RelayScope};
/// use duelrelay_protocol::EventKind;
///
/// let policy = RelayPolicy::default()
///     .with_scope(EventKind::ScoreAndStrength, RelayScope::AllMembers);
/// assert_eq!(policy.scope_for(EventKind::PositionUpdate), RelayScope::PeersOnly);
/// assert_eq!(policy.scope_for(EventKind::ScoreAndStrength), RelayScope::AllMembers);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayPolicy {
    default: RelayScope,
    overrides: HashMap<EventKind, RelayScope>,
}

impl RelayPolicy {
    /// Creates a policy where every kind uses `default`.
    pub fn new(default: RelayScope) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Overrides the scope for one event kind.
    pub fn with_scope(mut self, kind: EventKind, scope: RelayScope) -> Self {
        self.overrides.insert(kind, scope);
        self
    }

    /// Returns the scope that applies to `kind`.
    pub fn scope_for(&self, kind: EventKind) -> RelayScope {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
}

// ---------------------------------------------------------------------------
// BrokerConfig
// ---------------------------------------------------------------------------

/// Configuration for the matchmaking broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Room teardown on disconnect.
    pub teardown: TeardownPolicy,

    /// Who receives relayed events, per kind.
    pub relay: RelayPolicy,

    /// How long a client may sit in the waiting pool. `None` means
    /// forever.
    pub wait_timeout: Option<Duration>,

    /// Capacity of the broker actor's command channel.
    pub channel_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            teardown: TeardownPolicy::default(),
            relay: RelayPolicy::default(),
            wait_timeout: None,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl BrokerConfig {
    /// Sets the teardown policy.
    pub fn with_teardown(mut self, teardown: TeardownPolicy) -> Self {
        self.teardown = teardown;
        self
    }

    /// Sets the relay policy.
    pub fn with_relay(mut self, relay: RelayPolicy) -> Self {
        self.relay = relay;
        self
    }

    /// Enables the waiting-pool timeout.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }
}
