//! Room-scoped event relay: sessions, rooms, the publish pipeline, and the
//! WebSocket transport that drives them.

pub mod events;
pub mod fanout;
pub mod handler;
pub mod registry;
pub mod rooms;
pub mod server;
pub mod session;
