//! Error taxonomy shared by the Scribe service.
//!
//! Every error is scoped to a single request; none is fatal to the process.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Field-level validation messages, serialized as `{field: [messages]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single message on a single field
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// `Ok(())` when empty, otherwise a validation error
    pub fn into_result(self) -> Result<(), ScribeError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ScribeError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(" "))?;
        }
        Ok(())
    }
}

/// Errors surfaced by Scribe operations
#[derive(Debug, Error)]
pub enum ScribeError {
    /// Missing or malformed fields, including duplicate identifiers
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// Submitted captcha did not match the session's challenge
    #[error("captcha does not match")]
    CaptchaMismatch,

    /// Unknown identifier or wrong password, deliberately indistinguishable
    #[error("Unable to log in with provided credentials.")]
    InvalidCredentials,

    /// Token signature was valid but it has expired
    #[error("Signature has expired.")]
    TokenExpired,

    /// Token is malformed, forged, or names an unusable subject
    #[error("Error decoding signature.")]
    TokenInvalid,

    /// Authorization gate denied the request
    #[error("You do not have permission to perform this action.")]
    Forbidden,

    /// Requested record does not exist
    #[error("Not found.")]
    NotFound,

    /// Page number past the end of a list
    #[error("Invalid page.")]
    InvalidPage,

    /// Backing store unavailable or failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScribeError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::CaptchaMismatch => 400,
            Self::InvalidCredentials => 400,
            Self::TokenExpired => 401,
            Self::TokenInvalid => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::InvalidPage => 404,
            Self::Storage(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// JSON body sent to the client. Storage and internal details stay server-side.
    pub fn body(&self) -> serde_json::Value {
        match self {
            Self::Validation(errors) => serde_json::json!(errors),
            Self::InvalidCredentials => {
                serde_json::json!({ "non_field_errors": [self.to_string()] })
            }
            Self::Storage(_) => serde_json::json!({ "detail": "Service temporarily unavailable." }),
            Self::Internal(_) => serde_json::json!({ "detail": "Internal server error." }),
            _ => serde_json::json!({ "detail": self.to_string() }),
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_accumulate() {
        let mut errors = FieldErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.add("username", "This field is required.");
        errors.add("username", "Ensure this field has no more than 150 characters.");
        errors.add("email", "Enter a valid email address.");

        assert_eq!(errors.get("username").map(<[String]>::len), Some(2));
        assert!(errors.contains("email"));
        assert!(matches!(
            errors.into_result(),
            Err(ScribeError::Validation(_))
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ScribeError::CaptchaMismatch.status_code(), 400);
        assert_eq!(ScribeError::InvalidCredentials.status_code(), 400);
        assert_eq!(ScribeError::TokenExpired.status_code(), 401);
        assert_eq!(ScribeError::TokenInvalid.status_code(), 401);
        assert_eq!(ScribeError::Forbidden.status_code(), 403);
        assert_eq!(ScribeError::InvalidPage.status_code(), 404);
        assert_eq!(ScribeError::Storage("down".into()).status_code(), 503);
    }

    #[test]
    fn test_only_storage_failures_are_retryable() {
        assert!(ScribeError::Storage("down".into()).is_retryable());
        assert!(!ScribeError::Internal("bug".into()).is_retryable());
        assert!(!ScribeError::Forbidden.is_retryable());
    }

    #[test]
    fn test_bodies_do_not_leak_internals() {
        let body = ScribeError::Storage("redis at 10.0.0.3 refused".into()).body();
        assert!(!body.to_string().contains("10.0.0.3"));

        let body = ScribeError::CaptchaMismatch.body();
        assert_eq!(body["detail"], "captcha does not match");

        let body = ScribeError::Validation(FieldErrors::single("telephone", "bad")).body();
        assert_eq!(body["telephone"][0], "bad");

        let body = ScribeError::InvalidCredentials.body();
        assert_eq!(
            body["non_field_errors"][0],
            "Unable to log in with provided credentials."
        );
    }
}
