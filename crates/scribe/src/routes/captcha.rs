//! CAPTCHA image endpoint.

use axum::{
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue,
        header::{CACHE_CONTROL, CONTENT_TYPE, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use cookie::{Cookie, SameSite};
use scribe_common::constants::headers::SESSION_COOKIE;
use scribe_common::{FieldErrors, ScribeError};
use serde::Deserialize;

use super::{ApiError, ApiResult, session_id};
use crate::captcha::generate_session_id;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChallengeQuery {
    /// Number of characters in the challenge
    len: Option<String>,
}

/// Issue a challenge for the caller's session and return it as a PNG.
///
/// A request without a session cookie gets a fresh session.
pub async fn get_challenge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ChallengeQuery>,
) -> ApiResult<Response> {
    let length = match params.len.as_deref() {
        None => state.captcha_generator.default_length(),
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            ApiError(ScribeError::Validation(FieldErrors::single(
                "len",
                "A valid integer is required.",
            )))
        })?,
    };

    let (sid, is_new) = match session_id(&headers) {
        Some(sid) => (sid, false),
        None => (generate_session_id(), true),
    };

    let issued = state
        .captcha_generator
        .issue(state.challenges.as_ref(), &sid, length)
        .await?;

    tracing::debug!(
        length,
        expires_at = issued.expires_at,
        new_session = is_new,
        "Served CAPTCHA challenge"
    );

    let mut response_headers = HeaderMap::new();
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
    response_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if is_new {
        let cookie = Cookie::build((SESSION_COOKIE, sid))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        let value = HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| ScribeError::Internal(format!("session cookie: {}", e)))?;
        response_headers.insert(SET_COOKIE, value);
    }

    Ok((response_headers, issued.image).into_response())
}
