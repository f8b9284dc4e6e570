//! API error type
//!
//! Every failure surfaced to a caller maps to a stable machine-readable kind
//! plus a human-readable message. Passwords, activation codes and credentials
//! never appear in either.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bookish_shared::StoreError;
use serde_json::json;

use crate::auth::{JwtError, TokenError};
use crate::email::EmailError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("An account with this email already exists")]
    DuplicateEmail,
    #[error("Server misconfigured: {0}")]
    Configuration(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Activation token has expired. A new token has been sent to the same email address")]
    ExpiredToken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid session credential")]
    InvalidSignature,
    #[error("Session credential has expired")]
    ExpiredCredential,
    #[error("Could not deliver email: {0}")]
    EmailDelivery(String),
    #[error("Database error")]
    Database(#[source] StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Stable identifier clients can match on
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::DuplicateEmail => "duplicate_email",
            ApiError::Configuration(_) => "configuration_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::ExpiredToken => "expired_token",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::InvalidSignature => "invalid_signature",
            ApiError::ExpiredCredential => "expired_credential",
            ApiError::EmailDelivery(_) => "email_delivery_failed",
            ApiError::Database(_) => "database_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateEmail => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ExpiredToken => StatusCode::GONE,
            ApiError::InvalidCredentials
            | ApiError::InvalidSignature
            | ApiError::ExpiredCredential => StatusCode::UNAUTHORIZED,
            ApiError::EmailDelivery(_) => StatusCode::BAD_GATEWAY,
            ApiError::Configuration(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => ApiError::DuplicateEmail,
            other => ApiError::Database(other),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::Expired => ApiError::ExpiredCredential,
            JwtError::InvalidSignature => ApiError::InvalidSignature,
            JwtError::Encoding(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::NotFound => ApiError::NotFound("Activation token"),
            TokenError::OwnerMissing => ApiError::NotFound("User"),
            TokenError::CodeSpaceExhausted(attempts) => ApiError::Internal(format!(
                "no unused activation code after {} attempts",
                attempts
            )),
            TokenError::Store(e) => e.into(),
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(e: EmailError) -> Self {
        ApiError::EmailDelivery(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs
        let message = match &self {
            ApiError::Database(e) => {
                tracing::error!(error = ?e, "Database error");
                "Internal server error".to_string()
            }
            ApiError::Internal(msg) | ApiError::Configuration(msg) => {
                tracing::error!(error = %msg, kind = self.kind(), "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
