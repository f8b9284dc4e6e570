//! One-time activation codes
//!
//! Codes are six random decimal digits, valid for fifteen minutes and
//! accepted at most once.

use bookish_shared::{ActivationToken, SharedStore, StoreError, User};
use rand::Rng;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::clock::SharedClock;

pub const ACTIVATION_TOKEN_LENGTH: usize = 6;
pub const ACTIVATION_TOKEN_TTL_MINUTES: i64 = 15;

/// Draws allowed before giving up on finding a code nobody else holds
const MAX_CODE_ATTEMPTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Unknown code, or one that was already used
    #[error("Activation token not found")]
    NotFound,
    #[error("Activation token owner not found")]
    OwnerMissing,
    #[error("No unused activation code found after {0} attempts")]
    CodeSpaceExhausted(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of presenting a known, unused code
#[derive(Debug)]
pub enum Consumption {
    /// Token marked validated and the owner enabled
    Activated(User),
    /// Token was past its expiry.
    ///
    /// `reissued` carries the replacement code, or `None` when the owner
    /// already had a live code and nothing new was issued.
    Expired {
        user: User,
        reissued: Option<String>,
    },
}

/// Generate a numeric code with each digit drawn uniformly from 0-9
pub fn generate_activation_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == ACTIVATION_TOKEN_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Clone)]
pub struct TokenManager {
    store: SharedStore,
    clock: SharedClock,
}

impl TokenManager {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Persist a fresh code for `user` and return it in plaintext.
    ///
    /// The plaintext only ever leaves through the email sender.
    pub async fn issue(&self, user: &User) -> Result<String, TokenError> {
        let now = self.clock.now();
        let code = self.unused_code(now).await?;
        let token = new_token(user, code, now);
        self.store.save_activation_token(&token).await?;

        tracing::info!(
            user_id = %user.id,
            token_id = %token.id,
            expires_at = %token.expires_at,
            "Activation token issued"
        );

        Ok(token.token)
    }

    /// Redeem a code.
    ///
    /// Already-validated codes are treated as unknown. Expired codes trigger
    /// a replacement for a still-disabled owner and are never accepted.
    pub async fn consume(&self, code: &str) -> Result<Consumption, TokenError> {
        let token = self
            .store
            .find_activation_token(code)
            .await?
            .filter(|t| !t.is_validated())
            .ok_or(TokenError::NotFound)?;

        let now = self.clock.now();

        if token.is_expired_at(now) {
            let user = self
                .store
                .find_user_by_id(token.user_id)
                .await?
                .ok_or(TokenError::OwnerMissing)?;

            if user.enabled {
                tracing::info!(
                    user_id = %user.id,
                    token_id = %token.id,
                    "Expired activation token presented for an active account"
                );
                return Err(TokenError::NotFound);
            }

            let reissued = self.reissue(&user, now).await?;
            return Ok(Consumption::Expired { user, reissued });
        }

        match self
            .store
            .activate_with_token(token.id, token.user_id, now)
            .await?
        {
            Some(user) => {
                tracing::info!(user_id = %user.id, token_id = %token.id, "Account activated");
                Ok(Consumption::Activated(user))
            }
            None => {
                // Another request validated this token first
                tracing::warn!(token_id = %token.id, "Activation token already consumed");
                Err(TokenError::NotFound)
            }
        }
    }

    /// Replace an expired code unless the owner already holds a live one
    async fn reissue(
        &self,
        user: &User,
        now: OffsetDateTime,
    ) -> Result<Option<String>, TokenError> {
        let code = self.unused_code(now).await?;
        let candidate = new_token(user, code, now);

        match self.store.save_activation_token_unless_live(&candidate).await? {
            Some(token) => {
                tracing::info!(
                    user_id = %user.id,
                    token_id = %token.id,
                    "Activation token expired, issued a replacement"
                );
                Ok(Some(token.token))
            }
            None => {
                tracing::info!(
                    user_id = %user.id,
                    "Activation token expired, a live replacement is already on file"
                );
                Ok(None)
            }
        }
    }

    async fn unused_code(&self, now: OffsetDateTime) -> Result<String, TokenError> {
        self.pick_code(now, || generate_activation_code(ACTIVATION_TOKEN_LENGTH))
            .await
    }

    /// Draw codes until one is not live for any user at `now`
    async fn pick_code<F>(&self, now: OffsetDateTime, mut draw: F) -> Result<String, TokenError>
    where
        F: FnMut() -> String + Send,
    {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = draw();
            let taken = self
                .store
                .find_activation_token(&code)
                .await?
                .is_some_and(|t| t.is_live_at(now));
            if !taken {
                return Ok(code);
            }
            tracing::debug!("Activation code collided with a live token, drawing again");
        }
        Err(TokenError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }
}

fn new_token(user: &User, code: String, now: OffsetDateTime) -> ActivationToken {
    ActivationToken {
        id: Uuid::new_v4(),
        token: code,
        user_id: user.id,
        created_at: now,
        expires_at: now + Duration::minutes(ACTIVATION_TOKEN_TTL_MINUTES),
        validated_at: None,
    }
}
