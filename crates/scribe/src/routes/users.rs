//! Registration and user lookup endpoints.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use scribe_common::{Page, PublicUser, ScribeError};
use serde::{Deserialize, Serialize};

use super::{ApiResult, PageQuery, check_page, json_body, parse_id, session_id};
use crate::accounts::AccountFields;
use crate::auth::{Action, Caller, Resource, authorize};
use crate::state::AppState;

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RegisterRequest {
    telephone: String,
    email: String,
    username: String,
    password: String,
    /// Answer to the session's CAPTCHA challenge
    captcha: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    telephone: String,
    email: String,
    username: String,
    token: String,
}

/// Register an account behind the session's CAPTCHA
pub async fn register(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    authorize(&caller, Resource::Users, Action::Create)?;
    let request = json_body(payload)?;

    let fields = AccountFields {
        telephone: request.telephone,
        email: request.email,
        username: request.username,
        password: request.password,
    };
    let sid = session_id(&headers);
    let registration = state
        .auth_flow
        .register(sid.as_deref(), &request.captcha, fields)
        .await?;

    let user = registration.user;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            telephone: user.telephone,
            email: user.email,
            username: user.username,
            token: registration.token.token,
        }),
    ))
}

/// Paginated user list (authenticated callers only)
pub async fn list_users(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<PublicUser>>> {
    authorize(&caller, Resource::Users, Action::List)?;

    let page = query.number()?;
    let page_size = state.config.pagination.page_size;
    let (count, users) = state
        .accounts
        .list((page - 1).saturating_mul(page_size), page_size)
        .await?;
    check_page(page, page_size, count)?;

    let results = users.iter().map(|user| user.public()).collect();
    Ok(Json(Page::new("/users/", page, page_size, count, results)))
}

pub async fn retrieve_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<PublicUser>> {
    authorize(&caller, Resource::Users, Action::Retrieve)?;

    let id = parse_id(&id)?;
    let user = state.accounts.get(id).await?.ok_or(ScribeError::NotFound)?;
    Ok(Json(user.public()))
}
