//! Registry of live gateway sessions and the users they authenticated as.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relay_common::{RoomId, UserId};

use crate::error::RelayError;

use super::rooms::RoomTable;
use super::session::{GatewaySession, Outbox, OverflowPolicy};

/// Shared registry of all gateway sessions.
///
/// Uses `DashMap` for shard-level concurrency. Each session's room set is
/// kept in lock-step with the [`RoomTable`] it shares with the broadcaster.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<GatewaySession>>,
    rooms: Arc<RoomTable>,
    outbox_capacity: usize,
    overflow_policy: OverflowPolicy,
}

impl SessionRegistry {
    pub fn new(outbox_capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: Arc::new(RoomTable::new()),
            outbox_capacity,
            overflow_policy,
        }
    }

    /// Bind a new session to an authenticated user.
    pub fn register(
        &self,
        session_id: String,
        user_id: UserId,
    ) -> Result<Arc<GatewaySession>, RelayError> {
        match self.sessions.entry(session_id) {
            Entry::Occupied(entry) => Err(RelayError::DuplicateSession(entry.key().clone())),
            Entry::Vacant(entry) => {
                let outbox = Outbox::new(self.outbox_capacity, self.overflow_policy);
                let session = Arc::new(GatewaySession::new(entry.key().clone(), user_id, outbox));
                entry.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// Remove a session and detach it from every room it joined.
    ///
    /// Unknown sessions are ignored. Returns whether a session was removed.
    pub fn unregister(&self, session_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return false;
        };

        let rooms = session.close();
        for room_id in &rooms {
            self.rooms.detach(*room_id, &session);
        }

        tracing::debug!(
            session_id = %session.session_id,
            user_id = session.user_id,
            rooms = rooms.len(),
            "session unregistered"
        );
        true
    }

    pub fn user_of(&self, session_id: &str) -> Result<UserId, RelayError> {
        self.get(session_id).map(|session| session.user_id)
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<GatewaySession>, RelayError> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RelayError::UnknownSession(session_id.to_string()))
    }

    /// Rooms the session has joined, sorted.
    pub fn rooms_of(&self, session_id: &str) -> Result<Vec<RoomId>, RelayError> {
        self.get(session_id).map(|session| session.rooms())
    }

    /// The room table shared with the broadcaster.
    pub fn rooms(&self) -> Arc<RoomTable> {
        Arc::clone(&self.rooms)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
