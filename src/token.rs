//! Session token issuance and verification.
//!
//! Tokens are HS256 JWTs carrying the account identity. Verification accepts
//! the current secret and any previous secrets still listed in the session
//! settings, so the signing secret can be rotated without logging everyone out.

use crate::config::{SessionSettings, UserAccount};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub full_name: String,
    pub role: String,
}

impl From<&UserAccount> for Identity {
    fn from(user: &UserAccount) -> Self {
        Self {
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            role: user.role.clone(),
        }
    }
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub full_name: String,
    pub role: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiration (seconds since epoch)
    pub exp: i64,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            role: self.role.clone(),
        }
    }
}

/// Reasons a token was rejected or could not be produced.
///
/// Rejections are only distinguished for logging; clients always see a
/// plain 401.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature does not match")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

/// Issues and verifies session tokens. Stateless between calls.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    /// Current secret first, then previous secrets in rotation order
    decoding_keys: Vec<DecodingKey>,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(settings: &SessionSettings) -> Self {
        let decoding_keys = std::iter::once(&settings.secret)
            .chain(settings.previous_secrets.iter())
            .map(|secret| DecodingKey::from_secret(secret.as_bytes()))
            .collect();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_keys,
            validation,
            ttl: Duration::seconds(settings.ttl_secs as i64),
        }
    }

    /// Issue a token expiring one lifetime from now.
    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        self.issue_with_expiry(identity, Utc::now() + self.ttl)
    }

    /// Issue a token with an explicit expiration.
    pub fn issue_with_expiry(
        &self,
        identity: &Identity,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            username: identity.username.clone(),
            full_name: identity.full_name.clone(),
            role: identity.role.clone(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Check signature and expiration.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut rejection = TokenError::InvalidSignature;

        for key in &self.decoding_keys {
            match decode::<Claims>(token, key, &self.validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => match TokenError::from(e) {
                    // Try the next secret in the rotation
                    TokenError::InvalidSignature => rejection = TokenError::InvalidSignature,
                    other => return Err(other),
                },
            }
        }

        Err(rejection)
    }
}
