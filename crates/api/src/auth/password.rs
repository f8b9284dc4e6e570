//! Password hashing with Argon2id
//!
//! Stored hashes are PHC strings carrying their own salt and parameters, so
//! hashing the same password twice never yields the same string.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Passwords shorter than this are rejected at registration
pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password should be 8 characters or more")]
    TooShort,
    #[error("Password is needed for registration")]
    Blank,
    #[error("Failed to hash password")]
    Hash,
}

fn random_salt() -> Result<SaltString, PasswordError> {
    let bytes: [u8; 16] = rand::random();
    SaltString::encode_b64(&bytes).map_err(|_| PasswordError::Hash)
}

/// Hash a password for storage
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = random_salt()?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            PasswordError::Hash
        })
}

/// Check a password against a stored hash.
///
/// A malformed stored hash verifies as `false` rather than erroring.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn validate_password_strength(password: &str) -> Result<(), PasswordError> {
    if password.trim().is_empty() {
        return Err(PasswordError::Blank);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

/// A well-formed hash of a random, discarded secret.
///
/// Verifying against it costs the same as a real check, which keeps
/// unknown-email logins from being faster than wrong-password ones.
pub fn generate_impossible_hash() -> Result<String, PasswordError> {
    let secret: [u8; 32] = rand::random();
    let salt = random_salt()?;
    Argon2::default()
        .hash_password(&secret, &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::Hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_never_equals_plaintext() {
        let hash = hash_password("password123").unwrap();
        assert_ne!(hash, "password123");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_same_password_hashes_differently_and_both_verify() {
        let first = hash_password("password123").unwrap();
        let second = hash_password("password123").unwrap();

        assert_ne!(first, second);
        assert!(verify_password("password123", &first));
        assert!(verify_password("password123", &second));
    }

    #[test]
    fn test_wrong_password_fails() {
        let hash = hash_password("password123").unwrap();
        assert!(!verify_password("password124", &hash));
        assert!(!verify_password("", &hash));
    }

    #[test]
    fn test_malformed_hash_verifies_false() {
        assert!(!verify_password("password123", "not-a-phc-string"));
        assert!(!verify_password("password123", ""));
        assert!(!verify_password("password123", "$argon2id$v=19$garbage"));
    }

    #[test]
    fn test_password_strength() {
        assert!(matches!(
            validate_password_strength("short"),
            Err(PasswordError::TooShort)
        ));
        assert!(matches!(
            validate_password_strength("        "),
            Err(PasswordError::Blank)
        ));
        // Exactly the minimum is fine
        assert!(validate_password_strength("12345678").is_ok());
    }

    #[test]
    fn test_impossible_hash_is_well_formed() {
        let hash = generate_impossible_hash().unwrap();
        assert!(PasswordHash::new(&hash).is_ok());
        assert!(!verify_password("", &hash));
        assert!(!verify_password("password123", &hash));
    }
}
