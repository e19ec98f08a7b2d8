//! Bearer-credential authentication for gateway connections.
//!
//! The relay does not issue tokens. It only resolves a presented credential
//! to the user it was issued for.

pub mod middleware;
pub mod tokens;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_common::UserId;

/// The identity a credential resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no credential presented")]
    MissingCredential,

    #[error("credential is invalid")]
    InvalidCredential,

    #[error("credential has expired")]
    Expired,
}

/// Resolves a bearer credential to an [`Identity`].
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Strip the `Bearer ` scheme from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AuthError::InvalidCredential),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_strips_scheme() {
        assert_eq!(bearer_token("Bearer abc.def").unwrap(), "abc.def");
    }

    #[test]
    fn bearer_token_rejects_other_schemes() {
        assert_eq!(bearer_token("Basic abc"), Err(AuthError::InvalidCredential));
        assert_eq!(bearer_token("Bearer "), Err(AuthError::InvalidCredential));
        assert_eq!(bearer_token("abc"), Err(AuthError::InvalidCredential));
    }
}
