//! Per-connection gateway session state.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use relay_common::{RoomEvent, RoomId, UserId};
use tokio::sync::Notify;

/// Which message an outbox discards once it is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued message to make room for the new one.
    #[default]
    DropOldest,
    /// Keep the queue as is and discard the incoming message.
    DropNewest,
}

impl OverflowPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop_oldest" | "oldest" => Some(Self::DropOldest),
            "drop_newest" | "newest" => Some(Self::DropNewest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropOldest => "drop_oldest",
            Self::DropNewest => "drop_newest",
        }
    }
}

/// Result of offering a message to an [`Outbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Queued after evicting the oldest message.
    DroppedOldest,
    /// The queue was full and the offered message was discarded.
    DroppedNewest,
    /// The session is gone; nothing was queued.
    Closed,
}

/// Bounded outbound queue drained by the connection's writer loop.
///
/// `push` never waits, so a slow reader cannot stall a room broadcast.
#[derive(Debug)]
pub struct Outbox {
    queue: Mutex<VecDeque<Arc<RoomEvent>>>,
    capacity: usize,
    policy: OverflowPolicy,
    closed: AtomicBool,
    notify: Notify,
}

impl Outbox {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
            policy,
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, event: Arc<RoomEvent>) -> Enqueue {
        if self.is_closed() {
            return Enqueue::Closed;
        }

        let outcome = {
            let mut queue = self.queue.lock();
            if queue.len() < self.capacity {
                queue.push_back(event);
                Enqueue::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        queue.pop_front();
                        queue.push_back(event);
                        Enqueue::DroppedOldest
                    }
                    OverflowPolicy::DropNewest => Enqueue::DroppedNewest,
                }
            }
        };

        if outcome != Enqueue::DroppedNewest {
            self.notify.notify_one();
        }
        outcome
    }

    /// Wait for the next message. Returns `None` once the outbox is closed
    /// and drained.
    ///
    /// Cancel-safe: a message is only removed when it is returned.
    pub async fn recv(&self) -> Option<Arc<RoomEvent>> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<Arc<RoomEvent>> {
        self.queue.lock().pop_front()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

#[derive(Debug)]
struct Membership {
    rooms: HashSet<RoomId>,
    closed: bool,
}

/// State for a single WebSocket connection.
#[derive(Debug)]
pub struct GatewaySession {
    /// Unique session identifier (`ses_` prefixed ULID).
    pub session_id: String,
    /// User the connection authenticated as. Fixed at registration.
    pub user_id: UserId,
    /// Rooms this session has joined. Mirrors the rooms' subscriber sets.
    membership: Mutex<Membership>,
    outbox: Outbox,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl GatewaySession {
    pub fn new(session_id: String, user_id: UserId, outbox: Outbox) -> Self {
        Self {
            session_id,
            user_id,
            membership: Mutex::new(Membership {
                rooms: HashSet::new(),
                closed: false,
            }),
            outbox,
            seq: AtomicU64::new(0),
        }
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Snapshot of the joined rooms, sorted.
    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.membership.lock().rooms.iter().copied().collect();
        rooms.sort_unstable();
        rooms
    }

    /// Record a joined room. Must be called with the room's lock held.
    /// Returns `false` if the session has already been closed.
    pub(crate) fn add_room(&self, room_id: RoomId) -> bool {
        let mut membership = self.membership.lock();
        if membership.closed {
            return false;
        }
        membership.rooms.insert(room_id);
        true
    }

    /// Forget a room. Must be called with the room's lock held.
    pub(crate) fn remove_room(&self, room_id: RoomId) {
        self.membership.lock().rooms.remove(&room_id);
    }

    /// Refuse further joins, close the outbox, and return the rooms the
    /// session still has to be detached from.
    pub(crate) fn close(&self) -> Vec<RoomId> {
        let rooms = {
            let mut membership = self.membership.lock();
            membership.closed = true;
            membership.rooms.iter().copied().collect()
        };
        self.outbox.close();
        rooms
    }
}
