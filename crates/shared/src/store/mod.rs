//! Persistence contract for accounts, roles and activation tokens
//!
//! The API only talks to [`AccountStore`]; `PgAccountStore` backs production
//! and `InMemoryAccountStore` backs tests and local development.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{ActivationToken, Role, User};

pub use memory::InMemoryAccountStore;
pub use postgres::PgAccountStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint (user email, role name) was violated
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type SharedStore = Arc<dyn AccountStore>;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Insert or update a user, replacing its role links
    async fn save_user(&self, user: &User) -> StoreResult<User>;

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;

    async fn save_role(&self, role: &Role) -> StoreResult<Role>;

    /// Look up a token by its code.
    ///
    /// Codes may repeat over time; an unvalidated row wins over validated ones,
    /// then the most recently created.
    async fn find_activation_token(&self, token: &str) -> StoreResult<Option<ActivationToken>>;

    async fn save_activation_token(&self, token: &ActivationToken)
        -> StoreResult<ActivationToken>;

    /// Insert `token` unless its owner already holds a token that is live at
    /// `token.created_at`.
    ///
    /// The check and the insert happen as one step. Returns `None` and writes
    /// nothing when a live token is already on file.
    async fn save_activation_token_unless_live(
        &self,
        token: &ActivationToken,
    ) -> StoreResult<Option<ActivationToken>>;

    /// Mark the token validated and enable its owner as one atomic step.
    ///
    /// Returns `None` without touching the user if the token had already been
    /// validated, so two concurrent activations cannot both succeed.
    async fn activate_with_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        validated_at: OffsetDateTime,
    ) -> StoreResult<Option<User>>;

    /// Unvalidated tokens for `user_id` that have not expired at `now`
    async fn live_tokens_for_user(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> StoreResult<Vec<ActivationToken>>;
}
