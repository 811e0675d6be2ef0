//! Rooms: the pairing of exactly two identities.

use duelrelay_protocol::{ClientIdentity, RoomId};
use rand::Rng;

/// Produces fresh room ids. Boxed so tests can swap in a deterministic
/// sequence.
pub type RoomIdSource = Box<dyn FnMut() -> RoomId + Send>;

/// A live two-player room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    id: RoomId,
    /// `[first waiting, second arriving]`. Always two distinct identities.
    members: [ClientIdentity; 2],
}

impl Room {
    /// Creates a room pairing `first` (the dequeued waiter) with `second`.
    pub fn new(id: RoomId, first: ClientIdentity, second: ClientIdentity) -> Self {
        debug_assert_ne!(first, second, "a room needs two distinct members");
        Self {
            id,
            members: [first, second],
        }
    }

    /// Returns the room id.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Returns both members, oldest waiter first.
    pub fn members(&self) -> &[ClientIdentity; 2] {
        &self.members
    }
}

/// Generates a random room id: `room_` followed by 32 hex characters
/// (128 bits), so collisions are not a practical concern.
pub fn random_room_id() -> RoomId {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    RoomId::new(format!("room_{hex}"))
}
