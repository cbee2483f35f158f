//! CAPTCHA challenge issue.

use rand::Rng;
use scribe_common::constants::CAPTCHA_ALPHABET;
use scribe_common::{FieldErrors, ScribeError};

use super::{CaptchaRenderer, session_key};
use crate::store::{ChallengeStore, StoredChallenge};

/// A freshly issued challenge. Only `image` is sent to the client.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub text: String,
    /// PNG bytes
    pub image: Vec<u8>,
    pub expires_at: i64,
}

/// CAPTCHA generator service
pub struct CaptchaGenerator {
    renderer: CaptchaRenderer,
    /// Challenge TTL in seconds
    challenge_ttl: u64,
    default_length: usize,
    max_length: usize,
}

impl CaptchaGenerator {
    pub fn new(
        renderer: CaptchaRenderer,
        challenge_ttl: u64,
        default_length: usize,
        max_length: usize,
    ) -> Self {
        Self {
            renderer,
            challenge_ttl,
            default_length,
            max_length,
        }
    }

    pub fn default_length(&self) -> usize {
        self.default_length
    }

    /// Issue a challenge for `session_id`, replacing any earlier one
    pub async fn issue(
        &self,
        store: &dyn ChallengeStore,
        session_id: &str,
        length: usize,
    ) -> Result<IssuedChallenge, ScribeError> {
        if length == 0 || length > self.max_length {
            return Err(ScribeError::Validation(FieldErrors::single(
                "len",
                format!(
                    "Ensure this value is between 1 and {}.",
                    self.max_length
                ),
            )));
        }

        let text = random_text(&mut rand::rng(), length);
        let image = self.renderer.render(&text)?;

        let now = chrono::Utc::now().timestamp();
        let expires_at = now + self.challenge_ttl as i64;

        let stored = StoredChallenge {
            answer: text.clone(),
            created_at: now,
            expires_at,
        };
        store
            .put_challenge(&session_key(session_id), stored, self.challenge_ttl)
            .await?;

        tracing::debug!(length, expires_at, "Generated CAPTCHA challenge");

        Ok(IssuedChallenge {
            text,
            image,
            expires_at,
        })
    }
}

/// Draw `length` characters uniformly, with replacement, from the alphabet
pub fn random_text(rng: &mut impl Rng, length: usize) -> String {
    (0..length)
        .map(|_| CAPTCHA_ALPHABET[rng.random_range(0..CAPTCHA_ALPHABET.len())] as char)
        .collect()
}
