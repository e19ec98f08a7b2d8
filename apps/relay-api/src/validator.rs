//! Event validation against room rules.
//!
//! The review service owns the real room state (which checks exist, which
//! signature slots are open). The relay only asks it for a verdict.
//! [`BasicValidator`] enforces the field-level rules every event must meet and
//! is what the relay runs with when no richer validator is plugged in.

use async_trait::async_trait;
use relay_common::event::{CheckPayload, PagePayload, SignPayload};
use relay_common::RoomId;

/// Whether an event may be relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(String),
}

impl Verdict {
    fn reject(reason: impl Into<String>) -> Self {
        Self::Reject(reason.into())
    }
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate_check(&self, room_id: RoomId, payload: &CheckPayload) -> Verdict;
    async fn validate_sign(&self, room_id: RoomId, payload: &SignPayload) -> Verdict;
    async fn validate_page(&self, room_id: RoomId, payload: &PagePayload) -> Verdict;
}

/// Field-level checks only; no room state.
#[derive(Debug, Clone, Default)]
pub struct BasicValidator {
    max_page: Option<i32>,
}

impl BasicValidator {
    pub fn new(max_page: Option<i32>) -> Self {
        Self { max_page }
    }
}

#[async_trait]
impl Validator for BasicValidator {
    async fn validate_check(&self, _room_id: RoomId, payload: &CheckPayload) -> Verdict {
        if payload.check_num < 1 {
            return Verdict::reject("checkNum must be positive");
        }
        if payload.img_url.trim().is_empty() {
            return Verdict::reject("imgUrl must not be blank");
        }
        Verdict::Accept
    }

    async fn validate_sign(&self, _room_id: RoomId, payload: &SignPayload) -> Verdict {
        if payload.sign_num < 1 {
            return Verdict::reject("signNum must be positive");
        }
        if payload.img_url.trim().is_empty() {
            return Verdict::reject("imgUrl must not be blank");
        }
        Verdict::Accept
    }

    async fn validate_page(&self, _room_id: RoomId, payload: &PagePayload) -> Verdict {
        if payload.page_num < 1 {
            return Verdict::reject("pageNum must be positive");
        }
        match self.max_page {
            Some(max) if payload.page_num > max => {
                Verdict::reject(format!("pageNum {} is past the last page ({max})", payload.page_num))
            }
            _ => Verdict::Accept,
        }
    }
}
