//! # Scribe Common
//!
//! Shared types, errors, and constants used across Scribe components.
//!
//! ## Modules
//! - `types` - Core data structures (UserIdentity, Snippet, Page, etc.)
//! - `error` - The request-scoped error taxonomy
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod types;

pub use error::{FieldErrors, ScribeError};
pub use types::*;
