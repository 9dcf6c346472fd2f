//! Server-authoritative rooms and matches

pub mod authority;
pub mod error;
pub mod room;
pub mod spawn_pool;

pub use authority::{RoomAction, RoomHandle, RoomRegistry};
pub use error::RoomError;
pub use room::{Outbound, PlayerId, Room, RoomId, RoomRules};
