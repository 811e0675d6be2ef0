//! Two-player matchmaking and relay broker for duelrelay.
//!
//! Clients identify, wait in a FIFO pool, get paired into a room with the
//! oldest waiter, and from then on every game event one of them sends is
//! relayed to the other. The broker routes events; it never interprets
//! them.
//!
//! # Key types
//!
//! - [`Broker`]: the synchronous state machine (identify / relay /
//!   disconnect), testable without a transport
//! - [`BrokerHandle`]: send events to the broker actor from any task
//! - [`BrokerConfig`]: teardown policy, per-kind relay scope, wait timeout
//! - [`WaitingPool`], [`Room`]: the two pieces of matchmaking state

mod actor;
mod broker;
mod config;
mod error;
mod room;
mod waiting;

pub use actor::{BrokerHandle, spawn_broker, spawn_broker_with};
pub use broker::{Broker, BrokerStats, ClientPhase, Departure, Matched, RelayOutcome};
pub use config::{
    BrokerConfig, DEFAULT_CHANNEL_SIZE, RelayPolicy, RelayScope, TeardownPolicy,
};
pub use error::{BrokerError, ParsePolicyError};
pub use room::{Room, RoomIdSource, random_room_id};
pub use waiting::{WaitingEntry, WaitingPool};
