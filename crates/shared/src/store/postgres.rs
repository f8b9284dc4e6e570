use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AccountStore, StoreError, StoreResult};
use crate::models::{ActivationToken, Role, User};

/// Database row for the `users` table (roles live in `user_roles`)
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    firstname: String,
    lastname: String,
    email: String,
    password_hash: String,
    enabled: bool,
    account_locked: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl UserRow {
    fn into_user(self, roles: Vec<String>) -> User {
        User {
            id: self.id,
            firstname: self.firstname,
            lastname: self.lastname,
            email: self.email,
            password_hash: self.password_hash,
            enabled: self.enabled,
            account_locked: self.account_locked,
            roles,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Map unique violations to `StoreError::Conflict`
fn conflict_or_db(e: sqlx::Error, what: &str) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            tracing::debug!(constraint = ?db.constraint(), "Unique constraint violated");
            StoreError::Conflict(what.to_string())
        }
        _ => StoreError::Database(e),
    }
}

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn roles_of(&self, user_id: Uuid) -> StoreResult<Vec<String>> {
        let roles: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.name
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn hydrate(&self, row: Option<UserRow>) -> StoreResult<Option<User>> {
        match row {
            Some(row) => {
                let roles = self.roles_of(row.id).await?;
                Ok(Some(row.into_user(roles)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, firstname, lastname, email, password_hash, enabled,
                   account_locked, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, firstname, lastname, email, password_hash, enabled,
                   account_locked, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn save_user(&self, user: &User) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, firstname, lastname, email, password_hash,
                enabled, account_locked, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                firstname = EXCLUDED.firstname,
                lastname = EXCLUDED.lastname,
                email = EXCLUDED.email,
                password_hash = EXCLUDED.password_hash,
                enabled = EXCLUDED.enabled,
                account_locked = EXCLUDED.account_locked,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.firstname)
        .bind(&user.lastname)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.enabled)
        .bind(user.account_locked)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "user with this email already exists"))?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            SELECT $1, id FROM roles WHERE name = ANY($2)
            "#,
        )
        .bind(user.id)
        .bind(&user.roles)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(user.clone())
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, created_at FROM roles WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    async fn save_role(&self, role: &Role) -> StoreResult<Role> {
        let saved = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (id, name, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, created_at
            "#,
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(role.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "role already exists"))?;

        Ok(saved)
    }

    async fn find_activation_token(&self, token: &str) -> StoreResult<Option<ActivationToken>> {
        let found = sqlx::query_as::<_, ActivationToken>(
            r#"
            SELECT id, token, user_id, created_at, expires_at, validated_at
            FROM activation_tokens
            WHERE token = $1
            ORDER BY validated_at IS NOT NULL, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    async fn save_activation_token(
        &self,
        token: &ActivationToken,
    ) -> StoreResult<ActivationToken> {
        let saved = sqlx::query_as::<_, ActivationToken>(
            r#"
            INSERT INTO activation_tokens (id, token, user_id, created_at, expires_at, validated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET validated_at = EXCLUDED.validated_at
            RETURNING id, token, user_id, created_at, expires_at, validated_at
            "#,
        )
        .bind(token.id)
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.validated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved)
    }

    async fn save_activation_token_unless_live(
        &self,
        token: &ActivationToken,
    ) -> StoreResult<Option<ActivationToken>> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the owner serializes concurrent reissues for one user
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(token.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let has_live: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM activation_tokens
                WHERE user_id = $1
                  AND validated_at IS NULL
                  AND expires_at >= $2
            )
            "#,
        )
        .bind(token.user_id)
        .bind(token.created_at)
        .fetch_one(&mut *tx)
        .await?;

        if has_live {
            tx.rollback().await?;
            return Ok(None);
        }

        let saved = sqlx::query_as::<_, ActivationToken>(
            r#"
            INSERT INTO activation_tokens (id, token, user_id, created_at, expires_at, validated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, token, user_id, created_at, expires_at, validated_at
            "#,
        )
        .bind(token.id)
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.validated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(saved))
    }

    async fn activate_with_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        validated_at: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let mut tx = self.pool.begin().await?;

        // Conditional update doubles as the optimistic-concurrency check
        let claimed = sqlx::query(
            r#"
            UPDATE activation_tokens
            SET validated_at = $2
            WHERE id = $1
              AND user_id = $3
              AND validated_at IS NULL
            "#,
        )
        .bind(token_id)
        .bind(validated_at)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let enabled = sqlx::query(
            "UPDATE users SET enabled = TRUE, updated_at = $2 WHERE id = $1",
        )
        .bind(user_id)
        .bind(validated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if enabled == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;

        self.find_user_by_id(user_id).await
    }

    async fn live_tokens_for_user(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> StoreResult<Vec<ActivationToken>> {
        let tokens = sqlx::query_as::<_, ActivationToken>(
            r#"
            SELECT id, token, user_id, created_at, expires_at, validated_at
            FROM activation_tokens
            WHERE user_id = $1
              AND validated_at IS NULL
              AND expires_at >= $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }
}

// Needs a reachable Postgres; run with `DATABASE_URL=... cargo test -- --ignored`
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_ROLE;
    use time::Duration;

    fn user(email: &str, now: OffsetDateTime) -> User {
        User {
            id: Uuid::new_v4(),
            firstname: "Test".to_string(),
            lastname: "User".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            enabled: false,
            account_locked: false,
            roles: vec![DEFAULT_ROLE.to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    fn token(user_id: Uuid, code: &str, now: OffsetDateTime) -> ActivationToken {
        ActivationToken {
            id: Uuid::new_v4(),
            token: code.to_string(),
            user_id,
            created_at: now,
            expires_at: now + Duration::minutes(15),
            validated_at: None,
        }
    }

    async fn seeded(pool: PgPool, email: &str) -> (PgAccountStore, User, OffsetDateTime) {
        let store = PgAccountStore::new(pool);
        // Postgres keeps microseconds only
        let now = OffsetDateTime::from_unix_timestamp(OffsetDateTime::now_utc().unix_timestamp())
            .unwrap();
        store
            .save_role(&Role::new(DEFAULT_ROLE, now))
            .await
            .unwrap();
        let user = store.save_user(&user(email, now)).await.unwrap();
        (store, user, now)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_activation_has_one_winner(pool: PgPool) {
        let (store, user, now) = seeded(pool, "race@example.com").await;
        let t = store
            .save_activation_token(&token(user.id, "111111", now))
            .await
            .unwrap();

        let (token_id, user_id) = (t.id, user.id);
        let (a, b) = (store.clone(), store.clone());
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.activate_with_token(token_id, user_id, now).await }),
            tokio::spawn(async move { b.activate_with_token(token_id, user_id, now).await }),
        );

        let winners = [ra.unwrap().unwrap(), rb.unwrap().unwrap()]
            .iter()
            .filter(|r| r.is_some())
            .count();
        assert_eq!(winners, 1);

        let loaded = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(loaded.enabled);
        assert_eq!(loaded.roles, vec![DEFAULT_ROLE.to_string()]);

        let stored = store.find_activation_token("111111").await.unwrap().unwrap();
        assert_eq!(stored.validated_at, Some(now));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_activation_rejects_foreign_token(pool: PgPool) {
        let (store, owner, now) = seeded(pool, "owner@example.com").await;
        let intruder = store
            .save_user(&user("intruder@example.com", now))
            .await
            .unwrap();
        let t = store
            .save_activation_token(&token(owner.id, "222222", now))
            .await
            .unwrap();

        let result = store.activate_with_token(t.id, intruder.id, now).await.unwrap();
        assert!(result.is_none());

        let intruder = store.find_user_by_id(intruder.id).await.unwrap().unwrap();
        assert!(!intruder.enabled);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_save_unless_live_is_single_step(pool: PgPool) {
        let (store, user, now) = seeded(pool, "reissue@example.com").await;

        let (a, b) = (store.clone(), store.clone());
        let (first, second) = (token(user.id, "333333", now), token(user.id, "444444", now));
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.save_activation_token_unless_live(&first).await }),
            tokio::spawn(async move { b.save_activation_token_unless_live(&second).await }),
        );

        let saved = [ra.unwrap().unwrap(), rb.unwrap().unwrap()]
            .iter()
            .filter(|r| r.is_some())
            .count();
        assert_eq!(saved, 1);
        assert_eq!(store.live_tokens_for_user(user.id, now).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_duplicate_email_is_conflict(pool: PgPool) {
        let (store, _user, now) = seeded(pool, "dup@example.com").await;

        let result = store.save_user(&user("dup@example.com", now)).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }
}
