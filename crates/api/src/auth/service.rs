//! Account lifecycle: register, activate, authenticate
//!
//! An account moves from registered (disabled) to activated (enabled) by
//! redeeming an emailed code, and only then can it obtain session
//! credentials. Failures are returned as typed `ApiError`s; nothing is retried
//! here except the replacement code sent when an expired one is presented.

use std::sync::Arc;

use bookish_shared::{SharedStore, User, DEFAULT_ROLE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::clock::SharedClock;
use super::jwt::{ClaimMap, JwtManager, AUTHORITIES_CLAIM, FULL_NAME_CLAIM};
use super::password::{
    generate_impossible_hash, hash_password, validate_password_strength, verify_password,
};
use super::tokens::{is_well_formed_code, Consumption, TokenManager};
use crate::email::{EmailMessage, EmailTemplate, SharedEmailSender};
use crate::error::{ApiError, ApiResult};

const ACTIVATION_SUBJECT: &str = "Account activation";

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticationRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationResponse {
    pub token: String,
}

/// Basic shape check: one `@`, non-empty local part, dotted domain, no spaces
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && !email.chars().any(char::is_whitespace)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Argon2 work runs off the async executor
async fn verify_off_thread(password: &str, hash: &str) -> ApiResult<bool> {
    let (password, hash) = (password.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("password verification task failed: {}", e)))
}

async fn hash_off_thread(password: &str) -> ApiResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[derive(Clone)]
pub struct AuthService {
    store: SharedStore,
    tokens: TokenManager,
    jwt: JwtManager,
    email: SharedEmailSender,
    clock: SharedClock,
    activation_url: String,
    /// Verified against when the email is unknown, so timing matches a real miss
    decoy_hash: Arc<str>,
}

impl AuthService {
    pub fn new(
        store: SharedStore,
        jwt: JwtManager,
        email: SharedEmailSender,
        clock: SharedClock,
        activation_url: String,
    ) -> ApiResult<Self> {
        let decoy_hash = generate_impossible_hash()
            .map_err(|e| ApiError::Internal(format!("failed to prepare decoy hash: {}", e)))?;

        Ok(Self {
            tokens: TokenManager::new(store.clone(), clock.clone()),
            store,
            jwt,
            email,
            clock,
            activation_url,
            decoy_hash: decoy_hash.into(),
        })
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    /// Create a disabled account and email it an activation code.
    ///
    /// If the email cannot be sent the account stays persisted and disabled;
    /// `resend_activation` is the way to recover.
    pub async fn register(&self, request: RegistrationRequest) -> ApiResult<User> {
        let firstname = request.firstname.trim();
        let lastname = request.lastname.trim();
        if firstname.is_empty() {
            return Err(ApiError::Validation(
                "Firstname is needed for registration".to_string(),
            ));
        }
        if lastname.is_empty() {
            return Err(ApiError::Validation(
                "Lastname is needed for registration".to_string(),
            ));
        }

        let email = normalize_email(&request.email);
        if email.is_empty() {
            return Err(ApiError::Validation(
                "Email is needed for registration".to_string(),
            ));
        }
        if !is_valid_email(&email) {
            return Err(ApiError::Validation(
                "Email is not properly formatted".to_string(),
            ));
        }
        validate_password_strength(&request.password)
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ApiError::DuplicateEmail);
        }

        let role = self
            .store
            .find_role_by_name(DEFAULT_ROLE)
            .await?
            .ok_or_else(|| {
                ApiError::Configuration(format!("role {} was not initialized", DEFAULT_ROLE))
            })?;

        let password_hash = hash_off_thread(&request.password).await?;
        let now = self.clock.now();

        let user = User {
            id: Uuid::new_v4(),
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
            email,
            password_hash,
            enabled: false,
            account_locked: false,
            roles: vec![role.name],
            created_at: now,
            updated_at: now,
        };
        let user = self.store.save_user(&user).await?;

        tracing::info!(user_id = %user.id, "User registered");

        self.send_activation_email(&user).await?;

        Ok(user)
    }

    /// Redeem an activation code.
    ///
    /// An expired code has already been replaced by the time this returns
    /// `ExpiredToken`. The replacement goes out by email once; presenting the
    /// stale code again while it is live sends nothing.
    pub async fn activate(&self, code: &str) -> ApiResult<User> {
        let code = code.trim();
        if !is_well_formed_code(code) {
            return Err(ApiError::Validation(
                "Activation token must be a 6-digit code".to_string(),
            ));
        }

        match self.tokens.consume(code).await? {
            Consumption::Activated(user) => Ok(user),
            Consumption::Expired { user, reissued } => {
                // No code means the owner already received a live replacement
                if let Some(code) = reissued {
                    self.dispatch_activation_code(&user, code).await?;
                }
                Err(ApiError::ExpiredToken)
            }
        }
    }

    /// Exchange email and password for a signed session credential.
    ///
    /// Unknown email, wrong password, and disabled or locked accounts all
    /// produce the same `InvalidCredentials`.
    pub async fn authenticate(&self, request: AuthenticationRequest) -> ApiResult<String> {
        let email = normalize_email(&request.email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            verify_off_thread(&request.password, &self.decoy_hash).await?;
            tracing::warn!("Authentication failed: unknown email");
            return Err(ApiError::InvalidCredentials);
        };

        if !verify_off_thread(&request.password, &user.password_hash).await? {
            tracing::warn!(user_id = %user.id, "Authentication failed: wrong password");
            return Err(ApiError::InvalidCredentials);
        }

        if !user.can_sign_in() {
            tracing::warn!(
                user_id = %user.id,
                enabled = user.enabled,
                account_locked = user.account_locked,
                "Authentication failed: account not active"
            );
            return Err(ApiError::InvalidCredentials);
        }

        let mut claims = ClaimMap::new();
        claims.insert(FULL_NAME_CLAIM.to_string(), json!(user.full_name()));
        claims.insert(AUTHORITIES_CLAIM.to_string(), json!(user.roles));

        let token = self.jwt.generate_token(claims, &user.email)?;

        tracing::info!(user_id = %user.id, "User authenticated");
        Ok(token)
    }

    /// Send a fresh code to a registered, not yet activated account.
    ///
    /// Succeeds silently for unknown or already active emails.
    pub async fn resend_activation(&self, email: &str) -> ApiResult<()> {
        let email = normalize_email(email);
        match self.store.find_user_by_email(&email).await? {
            Some(user) if !user.enabled => self.send_activation_email(&user).await,
            Some(user) => {
                tracing::debug!(user_id = %user.id, "Resend requested for active account");
                Ok(())
            }
            None => {
                tracing::debug!("Resend requested for unknown email");
                Ok(())
            }
        }
    }

    async fn send_activation_email(&self, user: &User) -> ApiResult<()> {
        let code = self.tokens.issue(user).await?;
        self.dispatch_activation_code(user, code).await
    }

    async fn dispatch_activation_code(&self, user: &User, code: String) -> ApiResult<()> {
        let message = EmailMessage {
            to: user.email.clone(),
            recipient_name: user.full_name(),
            template: EmailTemplate::ActivateAccount,
            action_url: self.activation_url.clone(),
            code,
            subject: ACTIVATION_SUBJECT.to_string(),
        };

        self.email.send(&message).await.map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send activation email");
            ApiError::from(e)
        })
    }
}
