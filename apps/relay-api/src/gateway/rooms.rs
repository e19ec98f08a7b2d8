//! Room subscriber sets with one lock per room.
//!
//! Lock order is always room, then session membership. A `DashMap` guard is
//! never held while waiting on a room lock: lookups clone the `Arc<Room>` and
//! release the shard before locking.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use relay_common::{RoomEvent, RoomId};

use crate::error::RelayError;

use super::session::{Enqueue, GatewaySession};

/// Outcome of fanning one event out to a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fanout {
    /// Sessions the event was queued for.
    pub delivered: usize,
    /// Messages discarded by full outboxes (either this one or an older one).
    pub dropped: usize,
    /// Sessions that disconnected while the fan-out was running.
    pub skipped: usize,
}

struct RoomState {
    members: HashMap<String, Arc<GatewaySession>>,
    /// Set once the room has emptied and left the table. A joiner holding a
    /// stale `Arc<Room>` must look the room up again.
    retired: bool,
}

struct Room {
    state: Mutex<RoomState>,
}

impl Room {
    fn new() -> Self {
        Self {
            state: Mutex::new(RoomState {
                members: HashMap::new(),
                retired: false,
            }),
        }
    }
}

/// All live rooms, keyed by room ID.
pub struct RoomTable {
    rooms: DashMap<RoomId, Arc<Room>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    fn lookup(&self, room_id: RoomId) -> Option<Arc<Room>> {
        self.rooms.get(&room_id).map(|room| room.clone())
    }

    /// Add `session` to the room, creating the room if needed.
    ///
    /// Returns `Ok(false)` if it was already a member.
    pub fn attach(&self, room_id: RoomId, session: &Arc<GatewaySession>) -> Result<bool, RelayError> {
        loop {
            let room = self
                .rooms
                .entry(room_id)
                .or_insert_with(|| Arc::new(Room::new()))
                .clone();

            let mut state = room.state.lock();
            if state.retired {
                continue;
            }
            if state.members.contains_key(&session.session_id) {
                return Ok(false);
            }
            if !session.add_room(room_id) {
                self.retire_if_empty(room_id, &room, &mut state);
                return Err(RelayError::UnknownSession(session.session_id.clone()));
            }
            state
                .members
                .insert(session.session_id.clone(), Arc::clone(session));
            return Ok(true);
        }
    }

    /// Remove `session` from the room, deleting the room once it is empty.
    ///
    /// Returns `false` if it was not a member.
    pub fn detach(&self, room_id: RoomId, session: &GatewaySession) -> bool {
        let Some(room) = self.lookup(room_id) else {
            session.remove_room(room_id);
            return false;
        };

        let mut state = room.state.lock();
        let removed = state.members.remove(&session.session_id).is_some();
        session.remove_room(room_id);
        self.retire_if_empty(room_id, &room, &mut state);
        removed
    }

    fn retire_if_empty(&self, room_id: RoomId, room: &Arc<Room>, state: &mut RoomState) {
        if state.members.is_empty() && !state.retired {
            state.retired = true;
            self.rooms
                .remove_if(&room_id, |_, current| Arc::ptr_eq(current, room));
            tracing::debug!(room_id, "room emptied and removed");
        }
    }

    pub fn contains(&self, room_id: RoomId, session_id: &str) -> bool {
        self.lookup(room_id)
            .is_some_and(|room| room.state.lock().members.contains_key(session_id))
    }

    /// Queue `event` for every member while holding the room lock, so all
    /// members observe one per-room order.
    ///
    /// When `sender` is given, it must still be a member at this instant.
    pub fn fan_out(
        &self,
        room_id: RoomId,
        sender: Option<&str>,
        event: Arc<RoomEvent>,
    ) -> Result<Fanout, RelayError> {
        let room = self.lookup(room_id).ok_or(RelayError::RoomNotFound(room_id))?;
        let state = room.state.lock();
        if state.retired || state.members.is_empty() {
            return Err(RelayError::RoomNotFound(room_id));
        }
        if let Some(sender) = sender {
            if !state.members.contains_key(sender) {
                return Err(RelayError::NotInRoom(room_id));
            }
        }

        let mut fanout = Fanout::default();
        for session in state.members.values() {
            match session.outbox().push(Arc::clone(&event)) {
                Enqueue::Queued => fanout.delivered += 1,
                Enqueue::DroppedOldest => {
                    fanout.delivered += 1;
                    fanout.dropped += 1;
                    tracing::warn!(
                        session_id = %session.session_id,
                        room_id,
                        policy = session.outbox().policy().as_str(),
                        "session outbox full, dropped oldest message"
                    );
                }
                Enqueue::DroppedNewest => {
                    fanout.dropped += 1;
                    tracing::warn!(
                        session_id = %session.session_id,
                        room_id,
                        policy = session.outbox().policy().as_str(),
                        "session outbox full, dropped incoming message"
                    );
                }
                Enqueue::Closed => fanout.skipped += 1,
            }
        }
        Ok(fanout)
    }

    /// Snapshot of a room's subscribers, sorted. Empty if the room is absent.
    pub fn members(&self, room_id: RoomId) -> Vec<String> {
        let Some(room) = self.lookup(room_id) else {
            return Vec::new();
        };
        let mut members: Vec<String> = room.state.lock().members.keys().cloned().collect();
        members.sort_unstable();
        members
    }

    /// IDs of all live rooms, sorted.
    #[cfg(test)]
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::session::{OverflowPolicy, Outbox};

    fn session(id: &str, capacity: usize) -> Arc<GatewaySession> {
        Arc::new(GatewaySession::new(
            id.to_string(),
            1,
            Outbox::new(capacity, OverflowPolicy::DropOldest),
        ))
    }

    #[test]
    fn attach_is_idempotent() {
        let table = RoomTable::new();
        let a = session("a", 4);
        assert!(table.attach(7, &a).unwrap());
        assert!(!table.attach(7, &a).unwrap());
        assert_eq!(table.members(7), vec!["a".to_string()]);
        assert_eq!(a.rooms(), vec![7]);
    }

    #[test]
    fn detach_removes_empty_room() {
        let table = RoomTable::new();
        let a = session("a", 4);
        table.attach(7, &a).unwrap();
        assert!(table.detach(7, &a));
        assert!(!table.detach(7, &a));
        assert!(table.is_empty());
        assert!(a.rooms().is_empty());
    }

    #[test]
    fn attach_after_close_leaves_no_room_behind() {
        let table = RoomTable::new();
        let a = session("a", 4);
        a.close();
        assert_eq!(
            table.attach(7, &a),
            Err(RelayError::UnknownSession("a".to_string()))
        );
        assert!(table.is_empty());
    }

    #[test]
    fn fan_out_to_missing_room_fails() {
        let table = RoomTable::new();
        let err = table
            .fan_out(3, None, Arc::new(RoomEvent::page(3, 1)))
            .unwrap_err();
        assert_eq!(err, RelayError::RoomNotFound(3));
    }

    #[test]
    fn fan_out_requires_sender_membership() {
        let table = RoomTable::new();
        let a = session("a", 4);
        table.attach(3, &a).unwrap();
        let err = table
            .fan_out(3, Some("b"), Arc::new(RoomEvent::page(3, 1)))
            .unwrap_err();
        assert_eq!(err, RelayError::NotInRoom(3));
        assert!(a.outbox().is_empty());
    }

    #[test]
    fn fan_out_skips_closed_sessions() {
        let table = RoomTable::new();
        let a = session("a", 4);
        let b = session("b", 4);
        table.attach(3, &a).unwrap();
        table.attach(3, &b).unwrap();
        b.outbox().close();

        let fanout = table
            .fan_out(3, None, Arc::new(RoomEvent::page(3, 1)))
            .unwrap();
        assert_eq!(fanout.delivered, 1);
        assert_eq!(fanout.skipped, 1);
    }

    #[test]
    fn fan_out_reports_overflow() {
        let table = RoomTable::new();
        let a = session("a", 1);
        table.attach(3, &a).unwrap();
        table
            .fan_out(3, None, Arc::new(RoomEvent::page(3, 1)))
            .unwrap();
        let fanout = table
            .fan_out(3, None, Arc::new(RoomEvent::page(3, 2)))
            .unwrap();
        assert_eq!(fanout.delivered, 1);
        assert_eq!(fanout.dropped, 1);
        assert_eq!(a.outbox().try_recv().unwrap().payload["pageNum"], 2);
    }
}
