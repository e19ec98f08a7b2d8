//! Gateway opcodes, event names, and wire-format messages.

use relay_common::{EventKind, RoomEvent, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_JOIN: u8 = 4;
pub const OP_LEAVE: u8 = 5;
pub const OP_HEARTBEAT_ACK: u8 = 6;
pub const OP_PUBLISH: u8 = 8;
pub const OP_ERROR: u8 = 9;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a ROOM_EVENT dispatch carrying a relayed event unchanged.
    pub fn room_event(seq: u64, event: &RoomEvent) -> Result<Self, serde_json::Error> {
        Ok(Self::dispatch(
            EventName::ROOM_EVENT,
            seq,
            serde_json::to_value(event)?,
        ))
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }

    /// Build an ERROR message (op=9) for a failed request.
    ///
    /// `rejected` separates validator rejections from protocol and
    /// infrastructure failures.
    pub fn error(err: &RelayError) -> Self {
        Self {
            op: OP_ERROR,
            t: None,
            s: None,
            d: serde_json::json!({
                "code": err.code(),
                "message": err.to_string(),
                "rejected": err.is_rejection(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

// ---------------------------------------------------------------------------
// HEARTBEAT payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// JOIN / LEAVE payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub room_id: RoomId,
}

// ---------------------------------------------------------------------------
// PUBLISH payload
// ---------------------------------------------------------------------------

/// An event to relay, optionally carrying its own bearer token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishPayload {
    pub room_id: RoomId,
    pub kind: EventKind,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub token: Option<String>,
}

impl PublishPayload {
    /// Split into the event to relay and the per-message token.
    pub fn into_parts(self) -> (RoomEvent, Option<String>) {
        let event = RoomEvent {
            room_id: self.room_id,
            kind: self.kind,
            payload: self.payload,
        };
        (event, self.token)
    }
}

// ---------------------------------------------------------------------------
// Dispatch event types
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const ROOM_JOINED: &'static str = "ROOM_JOINED";
    pub const ROOM_LEFT: &'static str = "ROOM_LEFT";
    pub const ROOM_EVENT: &'static str = "ROOM_EVENT";
}
