pub mod event;
pub mod id;

pub use event::{EventKind, EventPayload, RoomEvent};
pub use id::{RoomId, UserId};
