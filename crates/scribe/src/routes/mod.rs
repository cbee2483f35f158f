//! HTTP route handlers for Scribe.

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, RETRY_AFTER},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use cookie::Cookie;
use scribe_common::constants::RETRY_AFTER_SECS;
use scribe_common::constants::headers::SESSION_COOKIE;
use scribe_common::{FieldErrors, ScribeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod captcha;
mod health;
mod snippets;
mod tokens;
mod users;


/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/", get(api_root))
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        // CAPTCHA
        .route("/captcha/", get(captcha::get_challenge))
        // Accounts
        .route("/users/", get(users::list_users).post(users::register))
        .route("/users/{id}/", get(users::retrieve_user))
        .route("/login/", post(tokens::login))
        .route("/refresh/", post(tokens::refresh))
        // Snippets
        .route("/snippets/", get(snippets::list_snippets).post(snippets::create_snippet))
        .route(
            "/snippets/{id}/",
            get(snippets::retrieve_snippet)
                .put(snippets::update_snippet)
                .patch(snippets::partial_update_snippet)
                .delete(snippets::destroy_snippet),
        )
        .route("/snippets/{id}/highlight/", get(snippets::highlight_snippet))
        .layer(TimeoutLayer::new(timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        // Add shared state
        .with_state(state)
}

/// A request-scoped failure, rendered as JSON
#[derive(Debug)]
pub struct ApiError(pub ScribeError);

impl From<ScribeError> for ApiError {
    fn from(err: ScribeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            ScribeError::Storage(msg) => tracing::error!(error = %msg, "Storage failure"),
            ScribeError::Internal(msg) => tracing::error!(error = %msg, "Internal failure"),
            _ => {}
        }

        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.0.body())).into_response();
        if self.0.is_retryable() {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Unwrap a JSON body, reporting a malformed one as a 400 with a JSON body
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        ApiError(ScribeError::Validation(FieldErrors::single(
            "detail",
            rejection.body_text(),
        )))
    })
}

/// Session id from the `sessionid` cookie, if present and well-formed
pub(crate) fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|sid| {
            !sid.is_empty()
                && sid.len() <= 128
                && sid.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}

/// Record id from a path segment. Anything that isn't a number names no record.
pub(crate) fn parse_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse().map_err(|_| ApiError(ScribeError::NotFound))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    /// 1-based page number; anything unparseable is an invalid page
    pub fn number(&self) -> Result<usize, ApiError> {
        match self.page.as_deref() {
            None | Some("") => Ok(1),
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(ApiError(ScribeError::InvalidPage)),
            },
        }
    }
}

/// Reject a page past the last one. The first page always exists.
pub(crate) fn check_page(page: usize, page_size: usize, count: usize) -> Result<(), ApiError> {
    if page > 1 && (page - 1).saturating_mul(page_size) >= count {
        return Err(ApiError(ScribeError::InvalidPage));
    }
    Ok(())
}

#[derive(Serialize)]
struct ApiRoot {
    users: &'static str,
    snippets: &'static str,
    captcha: &'static str,
    login: &'static str,
    token_refresh: &'static str,
}

async fn api_root() -> Json<ApiRoot> {
    Json(ApiRoot {
        users: "/users/",
        snippets: "/snippets/",
        captcha: "/captcha/",
        login: "/login/",
        token_refresh: "/refresh/",
    })
}
