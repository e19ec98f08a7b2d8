//! Room-scoped broadcast of review events to subscribed sessions.
//!
//! Each room has its own lock. Fan-out to a room happens entirely under that
//! lock, which gives every subscriber the same per-room order while traffic
//! in unrelated rooms proceeds in parallel. Delivery itself is a non-blocking
//! push into each session's bounded outbox.

use std::sync::Arc;

use relay_common::{RoomEvent, RoomId};

use crate::error::RelayError;

use super::registry::SessionRegistry;
use super::rooms::{Fanout, RoomTable};

/// Room membership and broadcast. Cloneable handle; store in AppState.
#[derive(Clone)]
pub struct RoomBroadcaster {
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomTable>,
}

impl RoomBroadcaster {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        let rooms = sessions.rooms();
        Self { sessions, rooms }
    }

    /// Subscribe a registered session to a room, creating the room if absent.
    pub fn join(&self, room_id: RoomId, session_id: &str) -> Result<(), RelayError> {
        let session = self.sessions.get(session_id)?;
        if self.rooms.attach(room_id, &session)? {
            tracing::debug!(room_id, session_id, "session joined room");
        }
        Ok(())
    }

    /// Unsubscribe a session. A room left empty is deleted. Leaving a room
    /// one is not in, or leaving as an unknown session, is a no-op.
    pub fn leave(&self, room_id: RoomId, session_id: &str) {
        let Ok(session) = self.sessions.get(session_id) else {
            return;
        };
        if self.rooms.detach(room_id, &session) {
            tracing::debug!(room_id, session_id, "session left room");
        }
    }

    pub fn is_member(&self, room_id: RoomId, session_id: &str) -> bool {
        self.rooms.contains(room_id, session_id)
    }

    /// Deliver `event` to every current subscriber of `room_id`.
    ///
    /// Sessions that disconnect mid-fan-out are skipped, and full outboxes
    /// shed according to their overflow policy; neither is an error.
    pub fn broadcast(&self, room_id: RoomId, event: Arc<RoomEvent>) -> Result<Fanout, RelayError> {
        self.rooms.fan_out(room_id, None, event)
    }

    /// Like [`broadcast`](Self::broadcast), but first re-confirms under the
    /// room lock that `sender` is still subscribed.
    pub fn publish(
        &self,
        room_id: RoomId,
        sender: &str,
        event: Arc<RoomEvent>,
    ) -> Result<Fanout, RelayError> {
        self.rooms.fan_out(room_id, Some(sender), event)
    }

    /// Session IDs subscribed to a room, sorted.
    pub fn subscribers(&self, room_id: RoomId) -> Vec<String> {
        self.rooms.members(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
