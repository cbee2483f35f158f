//! CAPTCHA generation and verification.
//!
//! A challenge is a short random string over `0-9a-zA-Z`, rendered to PNG and
//! stored against the requesting session. Raw session ids never reach the
//! store: challenges are keyed by a SHA-256 digest of the id.

mod generator;
mod render;
mod verifier;

pub use generator::{CaptchaGenerator, IssuedChallenge};
pub use render::CaptchaRenderer;
pub use verifier::CaptchaVerifier;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Store key for a session's challenge
pub fn session_key(session_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(session_id.as_bytes()))
}

/// Generate a cryptographically random session id
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
