//! Bearer-token authentication and the authorization gate.

pub mod gate;
mod token;

pub use gate::{Action, Resource, authorize, authorize_object};
pub use token::{Claims, TokenConfig, TokenService};

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use scribe_common::ScribeError;
use scribe_common::constants::headers::AUTH_SCHEMES;

use crate::routes::ApiError;
use crate::state::AppState;

/// Identity of the party making a request, resolved from the token alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User { user_id: u64, username: String },
}

impl Caller {
    pub fn from_claims(claims: &Claims) -> Self {
        Self::User {
            user_id: claims.user_id,
            username: claims.username.clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    pub fn user_id(&self) -> Option<u64> {
        match self {
            Self::User { user_id, .. } => Some(*user_id),
            Self::Anonymous => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::User { username, .. } => Some(username),
            Self::Anonymous => None,
        }
    }
}

/// Pull the credential out of an `Authorization` header.
///
/// `Ok(None)` means the request is anonymous: no header, or a scheme this
/// service does not handle. A recognised scheme with a missing or malformed
/// credential is an error.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ScribeError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ScribeError::TokenInvalid)?;

    let mut parts = value.split_whitespace();
    let Some(scheme) = parts.next() else {
        return Ok(None);
    };
    if !AUTH_SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
        return Ok(None);
    }

    match (parts.next(), parts.next()) {
        (Some(token), None) => Ok(Some(token)),
        _ => Err(ScribeError::TokenInvalid),
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(&parts.headers)? {
            Some(token) => {
                let claims = state.tokens.verify(token)?;
                Ok(Caller::from_claims(&claims))
            }
            None => Ok(Caller::Anonymous),
        }
    }
}
