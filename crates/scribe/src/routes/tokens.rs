//! Login and token refresh endpoints.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use scribe_common::{FieldErrors, ScribeError};
use serde::{Deserialize, Serialize};

use super::{ApiResult, json_body};
use crate::state::AppState;

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    /// Username or telephone
    username: String,
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    username: String,
    authenticated: bool,
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let request = json_body(payload)?;

    let mut errors = FieldErrors::new();
    if request.username.is_empty() {
        errors.add("username", "This field is required.");
    }
    if request.password.is_empty() {
        errors.add("password", "This field is required.");
    }
    errors.into_result()?;

    let (user, token) = state
        .auth_flow
        .login(&request.username, &request.password)
        .await?;

    Ok(Json(LoginResponse {
        token: token.token,
        username: user.username,
        authenticated: true,
    }))
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RefreshRequest {
    token: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<Json<RefreshResponse>> {
    let request = json_body(payload)?;
    if request.token.is_empty() {
        let errors = FieldErrors::single("token", "This field is required.");
        return Err(ScribeError::Validation(errors).into());
    }

    let issued = state.auth_flow.refresh(&request.token).await?;
    Ok(Json(RefreshResponse {
        token: issued.token,
    }))
}
