use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_common::RoomId;
use serde::Serialize;

use crate::auth::AuthError;

/// Request-scoped failures of a single gateway operation.
///
/// None of these are fatal: they end handling of the one inbound frame and
/// are reported back to the session that sent it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("session is not authenticated")]
    Unauthenticated,

    #[error("session is not a member of room {0}")]
    NotInRoom(RoomId),

    #[error("event rejected: {0}")]
    EventRejected(String),

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("session {0} is already registered")]
    DuplicateSession(String),

    #[error("room {0} has no subscribers")]
    RoomNotFound(RoomId),
}

impl RelayError {
    /// Stable machine-readable code sent in ERROR frames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::NotInRoom(_) => "NOT_IN_ROOM",
            Self::EventRejected(_) => "EVENT_REJECTED",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::UnknownSession(_) => "UNKNOWN_SESSION",
            Self::DuplicateSession(_) => "DUPLICATE_SESSION",
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
        }
    }

    /// Whether this is a business-rule rejection rather than an
    /// infrastructure or protocol failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::EventRejected(_))
    }
}

/// Structured API error returned to HTTP clients.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED".to_string(),
            message: message.into(),
        }
    }

    pub fn token_expired() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "TOKEN_EXPIRED".to_string(),
            message: "Access token has expired".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired => Self::token_expired(),
            AuthError::MissingCredential => Self::unauthorized("Missing Authorization header"),
            AuthError::InvalidCredential => Self::unauthorized("Invalid or expired token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_validator_rejections_count_as_rejections() {
        assert!(RelayError::EventRejected("stale page".into()).is_rejection());
        assert!(!RelayError::NotInRoom(7).is_rejection());
        assert!(!RelayError::Unauthenticated.is_rejection());
        assert!(!RelayError::InvalidPayload("missing checkNum".into()).is_rejection());
    }

    #[test]
    fn codes_are_distinct() {
        let errors = [
            RelayError::Unauthenticated,
            RelayError::NotInRoom(1),
            RelayError::EventRejected(String::new()),
            RelayError::InvalidPayload(String::new()),
            RelayError::UnknownSession("s".into()),
            RelayError::DuplicateSession("s".into()),
            RelayError::RoomNotFound(1),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(RelayError::code).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn expired_token_maps_to_dedicated_code() {
        let err = ApiError::from(AuthError::Expired);
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, "TOKEN_EXPIRED");
    }
}
