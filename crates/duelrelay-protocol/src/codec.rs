//! Codec trait and the JSON implementation.
//!
//! A codec converts between Rust values and frame bytes. Handlers are
//! generic over [`Codec`] so the wire format can change without touching
//! the broker.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values into frame bytes and decodes them back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON via `serde_json`.
///
/// Output is always valid UTF-8, so the transport sends it as text frames.
///
/// ```rust
/// use duelrelay_protocol::{ClientFrame, Codec, JsonCodec};
///
/// let frame: ClientFrame = JsonCodec.decode(br#"{"deviceId":"p1"}"#).unwrap();
/// assert!(matches!(frame, ClientFrame::Identify(_)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
