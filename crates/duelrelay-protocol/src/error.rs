//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// `Decode` and `InvalidMessage` together form the "malformed payload"
/// class: the frame is logged and dropped, the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame was not valid JSON, had an unknown `type`, or was
    /// missing a required field.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame decoded but breaks a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Returns `true` for errors caused by what the client sent, as
    /// opposed to errors producing our own output.
    pub fn is_malformed_payload(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::InvalidMessage(_))
    }
}
