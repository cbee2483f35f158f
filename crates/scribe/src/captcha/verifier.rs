//! CAPTCHA verification logic.

use scribe_common::ScribeError;

use super::session_key;
use crate::store::ChallengeStore;

/// CAPTCHA verifier service
pub struct CaptchaVerifier {
    /// Delete the challenge after a successful match
    single_use: bool,
}

impl CaptchaVerifier {
    pub fn new(single_use: bool) -> Self {
        Self { single_use }
    }

    /// Compare `submitted` with the session's challenge, case-insensitively.
    ///
    /// Fails closed: a missing or expired challenge never matches.
    pub async fn verify_and_consume(
        &self,
        store: &dyn ChallengeStore,
        session_id: &str,
        submitted: &str,
    ) -> Result<bool, ScribeError> {
        self.verify_at(store, session_id, submitted, chrono::Utc::now().timestamp())
            .await
    }

    pub async fn verify_at(
        &self,
        store: &dyn ChallengeStore,
        session_id: &str,
        submitted: &str,
        now: i64,
    ) -> Result<bool, ScribeError> {
        if submitted.is_empty() {
            return Ok(false);
        }

        let key = session_key(session_id);
        let Some(challenge) = store.get_challenge(&key).await? else {
            tracing::debug!("No CAPTCHA challenge for session");
            return Ok(false);
        };

        if now > challenge.expires_at {
            store.delete_challenge(&key).await?;
            tracing::debug!(expired_at = challenge.expires_at, "CAPTCHA challenge expired");
            return Ok(false);
        }

        let matched = challenge.answer.to_lowercase() == submitted.to_lowercase();
        if matched && self.single_use {
            store.delete_challenge(&key).await?;
        }

        if matched {
            tracing::debug!("CAPTCHA verified");
        } else {
            tracing::debug!("CAPTCHA answer mismatch");
        }

        Ok(matched)
    }
}
