//! HTTP routes

pub mod auth;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{auth::require_auth, state::AppState};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/authenticate", post(auth::authenticate))
        .route("/activate-account", get(auth::activate_account))
        .route("/resend-activation", post(auth::resend_activation))
        .merge(protected);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/auth", auth_routes)
        .with_state(state)
}
