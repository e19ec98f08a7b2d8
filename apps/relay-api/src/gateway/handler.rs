//! Publish pipeline shared by check, sign, and page-move events.
//!
//! Every kind goes through the same steps: resolve the sender, confirm room
//! membership, ask the validator, fan out. Only the validator method differs.

use std::sync::Arc;

use relay_common::event::{CheckPayload, EventPayload, PagePayload, SignPayload};
use relay_common::{EventKind, RoomEvent, RoomId, UserId};
use serde::Serialize;

use crate::auth::Authenticator;
use crate::error::RelayError;
use crate::validator::{Validator, Verdict};

use super::fanout::RoomBroadcaster;
use super::registry::SessionRegistry;
use super::rooms::Fanout;

/// Who is calling, passed explicitly into every gateway operation.
#[derive(Debug, Clone, Copy)]
pub struct Caller<'a> {
    pub session_id: &'a str,
    /// Bearer token attached to this one message, if the client sent one.
    pub credential: Option<&'a str>,
}

impl<'a> Caller<'a> {
    pub fn session(session_id: &'a str) -> Self {
        Self {
            session_id,
            credential: None,
        }
    }

    pub fn with_credential(self, credential: Option<&'a str>) -> Self {
        Self { credential, ..self }
    }
}

pub struct EventGateway {
    sessions: Arc<SessionRegistry>,
    broadcaster: RoomBroadcaster,
    validator: Arc<dyn Validator>,
    auth: Arc<dyn Authenticator>,
}

impl EventGateway {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        broadcaster: RoomBroadcaster,
        validator: Arc<dyn Validator>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            sessions,
            broadcaster,
            validator,
            auth,
        }
    }

    pub async fn check(
        &self,
        caller: Caller<'_>,
        room_id: RoomId,
        payload: &CheckPayload,
    ) -> Result<Fanout, RelayError> {
        self.submit(caller, encode(room_id, EventKind::Check, payload)?)
            .await
    }

    pub async fn sign(
        &self,
        caller: Caller<'_>,
        room_id: RoomId,
        payload: &SignPayload,
    ) -> Result<Fanout, RelayError> {
        self.submit(caller, encode(room_id, EventKind::Sign, payload)?)
            .await
    }

    pub async fn page(
        &self,
        caller: Caller<'_>,
        room_id: RoomId,
        payload: &PagePayload,
    ) -> Result<Fanout, RelayError> {
        self.submit(caller, encode(room_id, EventKind::Page, payload)?)
            .await
    }

    /// Validate an event of any kind and broadcast it to its room.
    ///
    /// The event's raw payload is what subscribers receive.
    pub async fn submit(&self, caller: Caller<'_>, event: RoomEvent) -> Result<Fanout, RelayError> {
        let user_id = self.resolve_user(caller).await?;
        let room_id = event.room_id;

        if !self.broadcaster.is_member(room_id, caller.session_id) {
            return Err(RelayError::NotInRoom(room_id));
        }

        let payload = event
            .decode()
            .map_err(|e| RelayError::InvalidPayload(e.to_string()))?;

        let verdict = match &payload {
            EventPayload::Check(p) => self.validator.validate_check(room_id, p).await,
            EventPayload::Sign(p) => self.validator.validate_sign(room_id, p).await,
            EventPayload::Page(p) => self.validator.validate_page(room_id, p).await,
        };
        if let Verdict::Reject(reason) = verdict {
            tracing::info!(
                room_id,
                user_id,
                kind = %event.kind,
                %reason,
                "event rejected by validator"
            );
            return Err(RelayError::EventRejected(reason));
        }

        let fanout = self
            .broadcaster
            .publish(room_id, caller.session_id, Arc::new(event))?;

        log_relayed(room_id, user_id, &payload, &fanout);
        Ok(fanout)
    }

    /// The session's bound user. A per-message credential, when present,
    /// must resolve to that same user.
    async fn resolve_user(&self, caller: Caller<'_>) -> Result<UserId, RelayError> {
        let user_id = self
            .sessions
            .user_of(caller.session_id)
            .map_err(|_| RelayError::Unauthenticated)?;

        if let Some(credential) = caller.credential {
            let identity = self.auth.authenticate(credential).await.map_err(|e| {
                tracing::debug!(session_id = caller.session_id, %e, "per-message credential refused");
                RelayError::Unauthenticated
            })?;
            if identity.user_id != user_id {
                tracing::warn!(
                    session_id = caller.session_id,
                    bound_user = user_id,
                    token_user = identity.user_id,
                    "per-message credential belongs to another user"
                );
                return Err(RelayError::Unauthenticated);
            }
        }

        Ok(user_id)
    }
}

fn encode<T: Serialize>(room_id: RoomId, kind: EventKind, payload: &T) -> Result<RoomEvent, RelayError> {
    let payload =
        serde_json::to_value(payload).map_err(|e| RelayError::InvalidPayload(e.to_string()))?;
    Ok(RoomEvent {
        room_id,
        kind,
        payload,
    })
}

fn log_relayed(room_id: RoomId, user_id: UserId, payload: &EventPayload, fanout: &Fanout) {
    match payload {
        EventPayload::Check(p) => tracing::info!(
            room_id,
            user_id,
            check_num = p.check_num,
            img_url = %p.img_url,
            delivered = fanout.delivered,
            "check relayed"
        ),
        EventPayload::Sign(p) => tracing::info!(
            room_id,
            user_id,
            sign_num = p.sign_num,
            img_url = %p.img_url,
            delivered = fanout.delivered,
            "sign relayed"
        ),
        EventPayload::Page(p) => tracing::info!(
            room_id,
            user_id,
            page_num = p.page_num,
            delivered = fanout.delivered,
            "page move relayed"
        ),
    }
}
