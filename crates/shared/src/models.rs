//! Account records shared between the persistence layer and the API

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Role assigned to every account at registration
pub const DEFAULT_ROLE: &str = "USER";

/// Registered account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// False until the account is activated with an emailed code
    pub enabled: bool,
    pub account_locked: bool,
    /// Role names, e.g. `["USER"]`
    pub roles: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }

    pub fn can_sign_in(&self) -> bool {
        self.enabled && !self.account_locked
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
}

impl Role {
    pub fn new(name: &str, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
        }
    }
}

/// One-time numeric code proving control of an email address.
///
/// Rows are never deleted; `validated_at` is set at most once.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ActivationToken {
    pub id: Uuid,
    pub token: String,
    pub user_id: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub validated_at: Option<OffsetDateTime>,
}

impl ActivationToken {
    pub fn is_validated(&self) -> bool {
        self.validated_at.is_some()
    }

    /// Expired once `now` is strictly past `expires_at`
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        !self.is_validated() && !self.is_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn token_at(now: OffsetDateTime) -> ActivationToken {
        ActivationToken {
            id: Uuid::new_v4(),
            token: "123456".to_string(),
            user_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + Duration::minutes(15),
            validated_at: None,
        }
    }

    #[test]
    fn test_token_expiry_boundary() {
        let now = OffsetDateTime::now_utc();
        let token = token_at(now);

        assert!(!token.is_expired_at(token.expires_at));
        assert!(token.is_expired_at(token.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_validated_token_is_not_live() {
        let now = OffsetDateTime::now_utc();
        let mut token = token_at(now);
        assert!(token.is_live_at(now));

        token.validated_at = Some(now);
        assert!(!token.is_live_at(now));
    }

    #[test]
    fn test_locked_user_cannot_sign_in() {
        let now = OffsetDateTime::now_utc();
        let mut user = User {
            id: Uuid::new_v4(),
            firstname: "Alice".to_string(),
            lastname: "Liddell".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            enabled: true,
            account_locked: false,
            roles: vec![DEFAULT_ROLE.to_string()],
            created_at: now,
            updated_at: now,
        };
        assert!(user.can_sign_in());
        assert_eq!(user.full_name(), "Alice Liddell");

        user.account_locked = true;
        assert!(!user.can_sign_in());
    }
}
