//! Connection registry for duelrelay.
//!
//! Maps each live [`ClientIdentity`](duelrelay_protocol::ClientIdentity)
//! to the outbound channel of the connection that owns it. Pure lookup
//! table, no matchmaking policy:
//!
//! ```text
//! Broker (above)    ← decides who gets what
//!     ↕
//! Registry (this crate)  ← knows where to send it
//!     ↕
//! Connection writer tasks (below) ← drain ClientSender into the socket
//! ```

mod error;
mod registry;

pub use error::RegistryError;
pub use registry::{ClientChannel, ClientSender, ConnectionRegistry};
