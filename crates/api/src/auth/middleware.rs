//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use super::jwt::{Claims, JwtError, JwtManager};

/// Cookie the frontend stores the session credential in
const AUTH_COOKIE: &str = "bookish_auth_token";

/// Authenticated caller extracted from a session credential
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub email: String,
    pub full_name: Option<String>,
    pub authorities: Vec<String>,
}

impl AuthUser {
    pub fn has_authority(&self, role: &str) -> bool {
        self.authorities.iter().any(|a| a == role)
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            full_name: claims.full_name().map(String::from),
            authorities: claims.authorities(),
            email: claims.sub,
        }
    }
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
}

/// Extract the credential from the HttpOnly session cookie
fn extract_token_from_cookie(request: &Request) -> Option<String> {
    request
        .headers()
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(str::trim)
                .find_map(|cookie| cookie.strip_prefix(AUTH_COOKIE)?.strip_prefix('='))
                .map(String::from)
        })
}

/// Extract bearer token from Authorization header or HttpOnly cookie.
/// Prefers the header but falls back to the cookie.
fn extract_bearer_token(request: &Request) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    extract_token_from_cookie(request)
}

fn authenticate(auth_state: &AuthState, token: &str) -> Result<AuthUser, AuthError> {
    auth_state
        .jwt_manager
        .validate_token(token)
        .map(AuthUser::from)
        .map_err(AuthError::from)
}

/// Middleware that requires a valid session credential
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let auth_result = match extract_bearer_token(&request) {
        Some(token) => authenticate(&auth_state, &token),
        None => Err(AuthError::MissingAuth),
    };

    match auth_result {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                subject = %auth_user.email,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            // Both credential failures are 401s; the log line tells them apart
            match err {
                AuthError::ExpiredToken => {
                    tracing::info!(path = %path, "require_auth: session credential expired")
                }
                _ => tracing::warn!(path = %path, error = ?err, "require_auth: authentication failed"),
            }
            err.into_response()
        }
    }
}

/// Middleware that attaches the caller if a valid credential is present
pub async fn optional_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer_token(&request) {
        if let Ok(auth_user) = authenticate(&auth_state, &token) {
            request.extensions_mut().insert(auth_user);
        }
    }

    next.run(request).await
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Expired token")]
    ExpiredToken,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JwtError> for AuthError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::Expired => AuthError::ExpiredToken,
            JwtError::InvalidSignature => AuthError::InvalidToken,
            JwtError::Encoding(msg) => AuthError::Internal(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AuthError::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "missing_auth",
                "Authentication required",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                "Invalid session credential",
            ),
            AuthError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "expired_credential",
                "Session credential has expired",
            ),
            AuthError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };

        let body = Json(json!({
            "error": kind,
            "message": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
