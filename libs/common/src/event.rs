//! Room event wire shape shared by the relay and its clients.
//!
//! An event travels as `{"roomId": 7, "kind": "check", "payload": {...}}`.
//! The relay keeps the payload as raw JSON so it can be forwarded to
//! subscribers exactly as the sender wrote it; [`RoomEvent::decode`] gives a
//! typed view for validation and logging.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::RoomId;

/// The three event kinds a review session exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Check,
    Sign,
    Page,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Sign => "sign",
            Self::Page => "page",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A room-scoped event as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEvent {
    pub room_id: RoomId,
    pub kind: EventKind,
    #[serde(default)]
    pub payload: Value,
}

/// A checkbox was ticked on a page of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPayload {
    pub check_num: i32,
    pub img_url: String,
}

/// A signature was placed in one of the document's signature slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPayload {
    pub sign_num: i32,
    pub img_url: String,
}

/// The presenter moved to another page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePayload {
    pub page_num: i32,
}

/// Typed view of an event payload, selected by [`EventKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Check(CheckPayload),
    Sign(SignPayload),
    Page(PagePayload),
}

impl RoomEvent {
    pub fn check(room_id: RoomId, check_num: i32, img_url: &str) -> Self {
        Self {
            room_id,
            kind: EventKind::Check,
            payload: serde_json::json!({ "checkNum": check_num, "imgUrl": img_url }),
        }
    }

    pub fn sign(room_id: RoomId, sign_num: i32, img_url: &str) -> Self {
        Self {
            room_id,
            kind: EventKind::Sign,
            payload: serde_json::json!({ "signNum": sign_num, "imgUrl": img_url }),
        }
    }

    pub fn page(room_id: RoomId, page_num: i32) -> Self {
        Self {
            room_id,
            kind: EventKind::Page,
            payload: serde_json::json!({ "pageNum": page_num }),
        }
    }

    /// Parse the raw payload into the shape required by `kind`.
    ///
    /// Extra fields are ignored here; they still travel to subscribers
    /// because broadcasts carry the raw payload.
    pub fn decode(&self) -> Result<EventPayload, serde_json::Error> {
        let payload = match self.kind {
            EventKind::Check => EventPayload::Check(CheckPayload::deserialize(&self.payload)?),
            EventKind::Sign => EventPayload::Sign(SignPayload::deserialize(&self.payload)?),
            EventKind::Page => EventPayload::Page(PagePayload::deserialize(&self.payload)?),
        };
        Ok(payload)
    }
}
