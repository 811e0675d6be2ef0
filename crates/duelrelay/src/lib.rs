//! # duelrelay
//!
//! Two-player matchmaking and relay server over WebSocket.
//!
//! Clients connect, identify with a `deviceId`, and are paired first come
//! first served into two-member rooms. Game events sent by one member are
//! relayed to the other; when a member disconnects the room is torn down
//! according to the configured [`TeardownPolicy`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duelrelay::prelude::*;
//!
//! # async fn start() -> Result<(), DuelRelayError> {
//! let server = DuelRelayServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{ConfigError, DEFAULT_PORT, ServerConfig};
pub use duelrelay_broker::TeardownPolicy;
pub use error::DuelRelayError;
pub use server::{DuelRelayServer, DuelRelayServerBuilder};

/// The commonly needed types in one import.
pub mod prelude {
    pub use crate::{ConfigError, DuelRelayError, DuelRelayServer, DuelRelayServerBuilder, ServerConfig};
    pub use duelrelay_broker::{
        BrokerConfig, BrokerHandle, BrokerStats, RelayPolicy, RelayScope, TeardownPolicy,
    };
    pub use duelrelay_protocol::{
        ClientFrame, ClientIdentity, EventKind, GameEvent, Identify, Notice, RelayEvent, RoomId,
        ServerMessage, StatusMessage,
    };
    pub use duelrelay_transport::HEALTH_BODY;
}
