//! Wire protocol for duelrelay.
//!
//! This crate defines what clients and the broker say to each other:
//!
//! - **Types** ([`ClientFrame`], [`GameEvent`], [`ServerMessage`], the
//!   [`ClientIdentity`] and [`RoomId`] newtypes): parsed once at the
//!   boundary into tagged unions, so nothing downstream inspects raw JSON.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those values are
//!   converted to and from frame bytes.
//! - **Errors** ([`ProtocolError`]): the "malformed payload" class.
//!
//! The protocol layer knows nothing about connections or rooms.
//!
//! ```text
//! Transport (frames) → Protocol (ClientFrame) → Broker (rooms, relay)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ClientFrame, ClientIdentity, EventKind, GameEvent, Identify, Notice,
    RelayEvent, RoomId, ServerMessage, StatusMessage,
};
