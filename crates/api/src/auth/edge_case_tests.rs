//! Edge Case Tests for Authentication System
//!
//! Tests boundary conditions in:
//! - Session credential lifetime and tampering
//! - Activation code expiry and reuse
//! - Password hashing inputs

#[cfg(test)]
mod jwt_tests {
    use super::super::jwt::*;
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    const TEST_SECRET: &str = "test-secret-key-at-least-32-chars!";

    fn name_claims() -> ClaimMap {
        let mut claims = ClaimMap::new();
        claims.insert(FULL_NAME_CLAIM.to_string(), json!("Edge Case"));
        claims
    }

    // =========================================================================
    // Token one second before expiry - should still be valid (zero leeway)
    // =========================================================================
    #[test]
    fn test_token_just_before_expiry_valid() {
        let jwt = JwtManager::new(TEST_SECRET, 1);
        let issued_at = OffsetDateTime::now_utc() - Duration::minutes(59);

        let token = jwt
            .generate_token_at(name_claims(), "edge@example.com", issued_at)
            .expect("Should generate token");

        assert!(jwt.validate_token(&token).is_ok());
    }

    // =========================================================================
    // Token a few seconds past expiry - no leeway, should be rejected
    // =========================================================================
    #[test]
    fn test_token_just_after_expiry_rejected() {
        let jwt = JwtManager::new(TEST_SECRET, 1);
        let issued_at = OffsetDateTime::now_utc() - Duration::hours(1) - Duration::seconds(5);

        let token = jwt
            .generate_token_at(name_claims(), "edge@example.com", issued_at)
            .expect("Should generate token");

        assert_eq!(jwt.validate_token(&token).unwrap_err(), JwtError::Expired);
    }

    // =========================================================================
    // Expiry duration follows configuration
    // =========================================================================
    #[test]
    fn test_access_token_expiry_hours() {
        let jwt = JwtManager::new(TEST_SECRET, 24);
        assert_eq!(jwt.access_token_expiry_seconds(), 24 * 3600);

        let token = jwt.generate_token(name_claims(), "edge@example.com").unwrap();
        let claims = jwt.validate_token(&token).unwrap();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        assert!((claims.exp - (now + 24 * 3600)).abs() < 5);
    }

    // =========================================================================
    // JTIs are unique between tokens for the same subject
    // =========================================================================
    #[test]
    fn test_jtis_are_unique() {
        let jwt = JwtManager::new(TEST_SECRET, 24);
        let a = jwt.generate_token(name_claims(), "edge@example.com").unwrap();
        let b = jwt.generate_token(name_claims(), "edge@example.com").unwrap();

        let a = jwt.validate_token(&a).unwrap();
        let b = jwt.validate_token(&b).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    // =========================================================================
    // Unsigned ("alg": "none") token - should be rejected
    // =========================================================================
    #[test]
    fn test_algorithm_none_rejected() {
        let jwt = JwtManager::new(TEST_SECRET, 24);
        let token = jwt.generate_token(name_claims(), "edge@example.com").unwrap();
        let payload = token.split('.').nth(1).unwrap();

        // {"alg":"none","typ":"JWT"}
        let unsigned = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{}.", payload);
        assert_eq!(
            jwt.validate_token(&unsigned).unwrap_err(),
            JwtError::InvalidSignature
        );
    }

    // =========================================================================
    // Stripped signature - should be rejected
    // =========================================================================
    #[test]
    fn test_missing_signature_rejected() {
        let jwt = JwtManager::new(TEST_SECRET, 24);
        let token = jwt.generate_token(name_claims(), "edge@example.com").unwrap();
        let without_sig = token.rsplit_once('.').unwrap().0.to_string() + ".";

        assert!(jwt.validate_token(&without_sig).is_err());
    }
}

#[cfg(test)]
mod activation_tests {
    use super::super::clock::{Clock, ManualClock};
    use super::super::tokens::*;
    use bookish_shared::{AccountStore, InMemoryAccountStore, User, DEFAULT_ROLE};
    use std::sync::Arc;
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    async fn setup() -> (Arc<InMemoryAccountStore>, Arc<ManualClock>, TokenManager, User) {
        let store = Arc::new(InMemoryAccountStore::new());
        let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
        let manager = TokenManager::new(store.clone(), clock.clone());
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            firstname: "Edge".to_string(),
            lastname: "Case".to_string(),
            email: "edge@example.com".to_string(),
            password_hash: "unused".to_string(),
            enabled: false,
            account_locked: false,
            roles: vec![DEFAULT_ROLE.to_string()],
            created_at: now,
            updated_at: now,
        };
        store.save_user(&user).await.unwrap();
        (store, clock, manager, user)
    }

    // =========================================================================
    // Token lifetime constants
    // =========================================================================
    #[test]
    fn test_activation_constants() {
        assert_eq!(ACTIVATION_TOKEN_LENGTH, 6, "Codes should be 6 digits");
        assert_eq!(
            ACTIVATION_TOKEN_TTL_MINUTES, 15,
            "Codes should expire after 15 minutes"
        );
    }

    // =========================================================================
    // Leading zeros are preserved
    // =========================================================================
    #[test]
    fn test_codes_keep_leading_zeros() {
        let has_leading_zero = (0..2000)
            .map(|_| generate_activation_code(ACTIVATION_TOKEN_LENGTH))
            .any(|code| code.starts_with('0') && code.len() == 6);
        assert!(has_leading_zero);
    }

    // =========================================================================
    // One second past expiry - rejected and replaced
    // =========================================================================
    #[tokio::test]
    async fn test_one_second_past_expiry_is_expired() {
        let (_store, clock, manager, user) = setup().await;
        let code = manager.issue(&user).await.unwrap();

        clock.advance(Duration::minutes(15) + Duration::seconds(1));
        assert!(matches!(
            manager.consume(&code).await.unwrap(),
            Consumption::Expired { .. }
        ));
    }

    // =========================================================================
    // Stale code presented again after its replacement also lapsed
    // =========================================================================
    #[tokio::test]
    async fn test_stale_code_reissues_again_once_replacement_lapses() {
        let (store, clock, manager, user) = setup().await;
        let code = manager.issue(&user).await.unwrap();
        clock.advance(Duration::hours(1));

        manager.consume(&code).await.unwrap();
        clock.advance(Duration::minutes(20));
        manager.consume(&code).await.unwrap();

        let live = store.live_tokens_for_user(user.id, clock.now()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(store.tokens_for_user(user.id).await.len(), 3);
    }

    // =========================================================================
    // Validated row is never handed back
    // =========================================================================
    #[tokio::test]
    async fn test_validated_token_rejected_even_within_window() {
        let (_store, _clock, manager, user) = setup().await;
        let code = manager.issue(&user).await.unwrap();

        manager.consume(&code).await.unwrap();
        assert!(matches!(
            manager.consume(&code).await,
            Err(TokenError::NotFound)
        ));
    }
}

#[cfg(test)]
mod password_tests {
    use super::super::password::*;

    // =========================================================================
    // Unicode passwords count characters, not bytes
    // =========================================================================
    #[test]
    fn test_unicode_password_length() {
        // 7 characters, 14 bytes
        assert!(validate_password_strength("ééééééé").is_err());
        assert!(validate_password_strength("éééééééé").is_ok());
    }

    // =========================================================================
    // Unicode and long passwords hash and verify
    // =========================================================================
    #[test]
    fn test_unusual_passwords_round_trip() {
        let long = "x".repeat(512);
        for password in ["пароль-безопасный", long.as_str()] {
            let hash = hash_password(password).expect("Should hash");
            assert!(verify_password(password, &hash));
        }
    }
}
