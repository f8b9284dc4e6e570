//! Registration, activation and authentication endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::{AuthUser, AuthenticationRequest, AuthenticationResponse, RegistrationRequest},
    error::ApiResult,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ActivateQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub email: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> ApiResult<StatusCode> {
    state.auth.register(request).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn authenticate(
    State(state): State<AppState>,
    Json(request): Json<AuthenticationRequest>,
) -> ApiResult<Json<AuthenticationResponse>> {
    let token = state.auth.authenticate(request).await?;
    Ok(Json(AuthenticationResponse { token }))
}

pub async fn activate_account(
    State(state): State<AppState>,
    Query(query): Query<ActivateQuery>,
) -> ApiResult<Json<Value>> {
    let user = state.auth.activate(&query.token).await?;
    Ok(Json(json!({ "email": user.email, "enabled": user.enabled })))
}

pub async fn resend_activation(
    State(state): State<AppState>,
    Json(request): Json<ResendRequest>,
) -> ApiResult<StatusCode> {
    state.auth.resend_activation(&request.email).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn me(Extension(user): Extension<AuthUser>) -> Json<AuthUser> {
    Json(user)
}
