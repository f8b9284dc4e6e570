//! Authentication module for Bookish

pub mod bootstrap;
pub mod clock;
#[cfg(test)]
mod edge_case_tests;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;
pub mod tokens;

pub use bootstrap::seed_default_roles;
pub use clock::{Clock, SharedClock, SystemClock};
pub use jwt::{ClaimMap, Claims, JwtError, JwtManager, AUTHORITIES_CLAIM, FULL_NAME_CLAIM};
pub use middleware::{optional_auth, require_auth, AuthError, AuthState, AuthUser};
pub use password::{
    generate_impossible_hash, hash_password, validate_password_strength, verify_password,
    PasswordError,
};
pub use service::{
    AuthService, AuthenticationRequest, AuthenticationResponse, RegistrationRequest,
};
pub use tokens::{Consumption, TokenError, TokenManager};
