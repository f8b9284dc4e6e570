//! Application state

use bookish_shared::SharedStore;

use crate::{
    auth::{AuthService, AuthState, JwtManager, SharedClock},
    config::Config,
    email::SharedEmailSender,
    error::ApiResult,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        config: Config,
        email: SharedEmailSender,
        clock: SharedClock,
    ) -> ApiResult<Self> {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        tracing::info!(
            expiry_hours = config.jwt_expiry_hours,
            "Session credential signing initialized"
        );

        let auth = AuthService::new(
            store.clone(),
            jwt_manager.clone(),
            email,
            clock,
            config.activation_url.clone(),
        )?;

        Ok(Self {
            store,
            config,
            jwt_manager,
            auth,
        })
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }
}
