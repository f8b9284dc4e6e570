use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AccountStore, StoreError, StoreResult};
use crate::models::{ActivationToken, Role, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    roles: HashMap<String, Role>,
    tokens: HashMap<Uuid, ActivationToken>,
}

/// Process-local store. Every operation runs under a single lock, which gives
/// the same all-or-nothing behaviour the Postgres store gets from transactions.
#[derive(Default)]
pub struct InMemoryAccountStore {
    tables: Mutex<Tables>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tokens ever issued to a user, oldest first
    pub async fn tokens_for_user(&self, user_id: Uuid) -> Vec<ActivationToken> {
        let tables = self.tables.lock().await;
        let mut tokens: Vec<_> = tables
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        tokens
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn save_user(&self, user: &User) -> StoreResult<User> {
        let mut tables = self.tables.lock().await;
        let taken = tables
            .users
            .values()
            .any(|u| u.email == user.email && u.id != user.id);
        if taken {
            return Err(StoreError::Conflict(format!(
                "user with email {} already exists",
                user.email
            )));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self.tables.lock().await.roles.get(name).cloned())
    }

    async fn save_role(&self, role: &Role) -> StoreResult<Role> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.roles.get(&role.name) {
            if existing.id != role.id {
                return Err(StoreError::Conflict(format!(
                    "role {} already exists",
                    role.name
                )));
            }
        }
        tables.roles.insert(role.name.clone(), role.clone());
        Ok(role.clone())
    }

    async fn find_activation_token(&self, token: &str) -> StoreResult<Option<ActivationToken>> {
        let tables = self.tables.lock().await;
        let found = tables
            .tokens
            .values()
            .filter(|t| t.token == token)
            .max_by_key(|t| (!t.is_validated(), t.created_at))
            .cloned();
        Ok(found)
    }

    async fn save_activation_token(
        &self,
        token: &ActivationToken,
    ) -> StoreResult<ActivationToken> {
        let mut tables = self.tables.lock().await;
        tables.tokens.insert(token.id, token.clone());
        Ok(token.clone())
    }

    async fn save_activation_token_unless_live(
        &self,
        token: &ActivationToken,
    ) -> StoreResult<Option<ActivationToken>> {
        let mut tables = self.tables.lock().await;
        let has_live = tables
            .tokens
            .values()
            .any(|t| t.user_id == token.user_id && t.is_live_at(token.created_at));
        if has_live {
            return Ok(None);
        }
        tables.tokens.insert(token.id, token.clone());
        Ok(Some(token.clone()))
    }

    async fn activate_with_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        validated_at: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Ok(None);
        }

        match tables.tokens.get_mut(&token_id) {
            Some(token) if token.user_id == user_id && token.validated_at.is_none() => {
                token.validated_at = Some(validated_at);
            }
            _ => return Ok(None),
        }

        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.enabled = true;
        user.updated_at = validated_at;
        Ok(Some(user.clone()))
    }

    async fn live_tokens_for_user(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> StoreResult<Vec<ActivationToken>> {
        let tables = self.tables.lock().await;
        let mut tokens: Vec<_> = tables
            .tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_live_at(now))
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        Ok(tokens)
    }
}
