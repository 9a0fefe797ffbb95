//! Session tokens
//!
//! HS256 JWTs identifying a user to this backend. The signing key is built
//! once at start-up and lives in `AppState` for the life of the process.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::store::User;

/// Session lifetime
pub const SESSION_TTL_DAYS: i64 = 7;

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: i64,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to sign session token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Issues and verifies session tokens
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionTokens {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    /// Sign a token for `user`, expiring seven days from now
    pub fn issue(&self, user: &User) -> Result<String, SessionError> {
        let now = Utc::now();
        let claims = SessionClaims {
            user_id: user.id,
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verify a presented token. Any failure yields `None`.
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        match decode::<SessionClaims>(token.trim(), &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                tracing::debug!(reason = ?err.kind(), "Session token rejected");
                None
            }
        }
    }
}
