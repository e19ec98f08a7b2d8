//! HS256 access-token verification.

use async_trait::async_trait;
use chrono::DateTime;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use relay_common::UserId;
use serde::{Deserialize, Serialize};

use super::{AuthError, Authenticator, Identity};

/// Claims carried by access tokens issued by the account service.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Numeric user ID, encoded as a string.
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Verifies access tokens signed with a shared HMAC secret.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Decode and validate a token without the async wrapper.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => {
                    tracing::debug!(?e, "access token validation failed");
                    AuthError::InvalidCredential
                }
            })?;

        let user_id: UserId = data
            .claims
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidCredential)?;
        let expires_at =
            DateTime::from_timestamp(data.claims.exp, 0).ok_or(AuthError::InvalidCredential)?;

        Ok(Identity {
            user_id,
            expires_at,
        })
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError> {
        self.verify(credential)
    }
}
