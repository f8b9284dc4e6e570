//! Session credentials: HS256 JWTs carrying a subject and arbitrary claims
//!
//! The signing key is loaded once from configuration and never rotated at
//! runtime. Validation checks the signature before expiry, so a tampered
//! token reports `InvalidSignature` even when it is also stale.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Human-readable display name, present in every issued credential
pub const FULL_NAME_CLAIM: &str = "fullName";
/// Role names granted to the subject
pub const AUTHORITIES_CLAIM: &str = "authorities";

/// Registered claim names callers cannot override
const RESERVED_CLAIMS: &[&str] = &["sub", "iat", "exp", "jti"];

pub type ClaimMap = Map<String, Value>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JwtError {
    /// Bad signature, wrong key, or a token that does not parse
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Failed to encode token: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(flatten)]
    pub extra: ClaimMap,
}

impl Claims {
    pub fn full_name(&self) -> Option<&str> {
        self.extra.get(FULL_NAME_CLAIM).and_then(Value::as_str)
    }

    pub fn authorities(&self) -> Vec<String> {
        self.extra
            .get(AUTHORITIES_CLAIM)
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

impl JwtManager {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.expiry_hours.saturating_mul(3600)
    }

    /// Sign a credential for `subject` that expires after the configured lifetime
    pub fn generate_token(&self, claims: ClaimMap, subject: &str) -> Result<String, JwtError> {
        self.generate_token_at(claims, subject, OffsetDateTime::now_utc())
    }

    pub(crate) fn generate_token_at(
        &self,
        mut claims: ClaimMap,
        subject: &str,
        issued_at: OffsetDateTime,
    ) -> Result<String, JwtError> {
        for reserved in RESERVED_CLAIMS {
            if claims.remove(*reserved).is_some() {
                tracing::debug!(claim = *reserved, "Dropping caller-supplied reserved claim");
            }
        }

        let expires_at = self
            .expiry_hours
            .checked_mul(3600)
            .and_then(|secs| issued_at.checked_add(Duration::seconds(secs)))
            .ok_or_else(|| {
                JwtError::Encoding(format!(
                    "session lifetime of {} hours is out of range",
                    self.expiry_hours
                ))
            })?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            extra: claims,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Verify signature, then expiry, and return the embedded claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::InvalidSignature,
            })
    }

    /// Signature-checked subject extraction
    pub fn subject_of(&self, token: &str) -> Result<String, JwtError> {
        self.validate_token(token).map(|claims| claims.sub)
    }
}
