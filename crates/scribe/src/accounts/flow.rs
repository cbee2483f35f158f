//! Registration, login, and token refresh.
//!
//! Registration walks `AwaitingCaptcha -> CaptchaVerified -> IdentityCreated
//! -> TokenIssued`. The captcha is settled before anything is written, so a
//! rejected attempt leaves the credential store untouched.

use scribe_common::{IssuedToken, ScribeError, UserIdentity};
use std::fmt;
use std::sync::Arc;

use super::manager::{AccountFields, ExtraFlags, UserManager, validate_account_fields};
use crate::auth::TokenService;
use crate::captcha::CaptchaVerifier;
use crate::store::ChallengeStore;

/// Where a registration attempt stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStage {
    AwaitingCaptcha,
    CaptchaVerified,
    IdentityCreated,
    TokenIssued,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingCaptcha => "awaiting_captcha",
            Self::CaptchaVerified => "captcha_verified",
            Self::IdentityCreated => "identity_created",
            Self::TokenIssued => "token_issued",
        };
        f.write_str(name)
    }
}

/// A completed registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: UserIdentity,
    pub token: IssuedToken,
}

/// Account lifecycle over the user factory, captcha verifier, and token service
pub struct AuthFlow {
    accounts: Arc<UserManager>,
    challenges: Arc<dyn ChallengeStore>,
    verifier: Arc<CaptchaVerifier>,
    tokens: Arc<TokenService>,
}

impl AuthFlow {
    pub fn new(
        accounts: Arc<UserManager>,
        challenges: Arc<dyn ChallengeStore>,
        verifier: Arc<CaptchaVerifier>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            accounts,
            challenges,
            verifier,
            tokens,
        }
    }

    /// Register a new account behind a captcha check
    pub async fn register(
        &self,
        session_id: Option<&str>,
        captcha_answer: &str,
        fields: AccountFields,
    ) -> Result<Registration, ScribeError> {
        let mut stage = RegistrationStage::AwaitingCaptcha;
        let result = self
            .register_stages(session_id, captcha_answer, fields, &mut stage)
            .await;

        match &result {
            Ok(registration) => tracing::info!(
                user_id = registration.user.id,
                stage = %stage,
                "Registration complete"
            ),
            Err(e) => tracing::debug!(stage = %stage, error = %e, "Registration rejected"),
        }

        result
    }

    async fn register_stages(
        &self,
        session_id: Option<&str>,
        captcha_answer: &str,
        fields: AccountFields,
        stage: &mut RegistrationStage,
    ) -> Result<Registration, ScribeError> {
        let Some(session_id) = session_id.filter(|_| !captcha_answer.is_empty()) else {
            return Err(ScribeError::CaptchaMismatch);
        };
        if !self
            .verifier
            .verify_and_consume(self.challenges.as_ref(), session_id, captcha_answer)
            .await?
        {
            return Err(ScribeError::CaptchaMismatch);
        }
        *stage = RegistrationStage::CaptchaVerified;

        validate_account_fields(&fields)?;
        let user = self
            .accounts
            .create_user(fields, ExtraFlags::default())
            .await?;
        *stage = RegistrationStage::IdentityCreated;

        let token = self.tokens.mint(&user)?;
        *stage = RegistrationStage::TokenIssued;

        Ok(Registration { user, token })
    }

    /// Exchange an identifier (username or telephone) and password for a token.
    ///
    /// Unknown identifier, wrong password, and inactive account all fail the
    /// same way.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(UserIdentity, IssuedToken), ScribeError> {
        if identifier.is_empty() || password.is_empty() {
            return Err(ScribeError::InvalidCredentials);
        }

        let Some(user) = self.accounts.find_by_identifier(identifier).await? else {
            self.accounts.verify_dummy_password(password).await;
            tracing::debug!("Login for unknown identifier");
            return Err(ScribeError::InvalidCredentials);
        };

        if !self.accounts.verify_password(&user, password).await || !user.is_active {
            tracing::debug!(user_id = user.id, "Login rejected");
            return Err(ScribeError::InvalidCredentials);
        }

        let token = self.tokens.mint(&user)?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((user, token))
    }

    /// Exchange a valid token for a fresh one with the same subject
    pub async fn refresh(&self, token: &str) -> Result<IssuedToken, ScribeError> {
        self.refresh_at(token, chrono::Utc::now().timestamp()).await
    }

    pub async fn refresh_at(&self, token: &str, now: i64) -> Result<IssuedToken, ScribeError> {
        let claims = self.tokens.verify_at(token, now)?;
        self.tokens.check_refreshable(&claims, now)?;

        let user = match self.accounts.get(claims.user_id).await? {
            Some(user) if user.is_active => user,
            _ => {
                tracing::debug!(user_id = claims.user_id, "Refresh for unusable subject");
                return Err(ScribeError::TokenInvalid);
            }
        };

        self.tokens.mint_at(&user, now, claims.orig_iat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenConfig;
    use crate::captcha::session_key;
    use crate::store::{MemoryStore, StoredChallenge};

    struct Harness {
        store: Arc<MemoryStore>,
        flow: AuthFlow,
        tokens: Arc<TokenService>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let tokens = Arc::new(TokenService::new(&TokenConfig {
            secret: "flow-test-secret".into(),
            issuer: "scribe".into(),
            ttl_secs: 300,
            refresh_window_secs: 3600,
        }));
        let flow = AuthFlow::new(
            Arc::new(UserManager::new(store.clone())),
            store.clone(),
            Arc::new(CaptchaVerifier::new(false)),
            tokens.clone(),
        );
        Harness {
            store,
            flow,
            tokens,
        }
    }

    async fn seed_challenge(store: &MemoryStore, session_id: &str, answer: &str) {
        let now = chrono::Utc::now().timestamp();
        store
            .put_challenge(
                &session_key(session_id),
                StoredChallenge {
                    answer: answer.into(),
                    created_at: now,
                    expires_at: now + 300,
                },
                300,
            )
            .await
            .unwrap();
    }

    fn alice() -> AccountFields {
        AccountFields {
            telephone: "13800000000".into(),
            email: "alice@example.com".into(),
            username: "alice".into(),
            password: "pw12345".into(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login_by_either_identifier() {
        let h = harness();
        seed_challenge(&h.store, "sid", "aB3d").await;

        let registration = h.flow.register(Some("sid"), "ab3D", alice()).await.unwrap();
        assert_eq!(registration.user.username, "alice");
        let claims = h.tokens.verify(&registration.token.token).unwrap();
        assert_eq!(claims.user_id, registration.user.id);

        let (by_name, _) = h.flow.login("alice", "pw12345").await.unwrap();
        let (by_phone, _) = h.flow.login("13800000000", "pw12345").await.unwrap();
        assert_eq!(by_name.id, by_phone.id);
    }

    #[tokio::test]
    async fn test_bad_captcha_writes_nothing() {
        let h = harness();
        seed_challenge(&h.store, "sid", "aB3d").await;

        for (session, answer) in [(Some("sid"), "zzzz"), (Some("sid"), ""), (None, "aB3d")] {
            let err = h.flow.register(session, answer, alice()).await.unwrap_err();
            assert!(matches!(err, ScribeError::CaptchaMismatch));
        }
        assert_eq!(h.store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_captcha_checked_before_field_validation() {
        let h = harness();
        let err = h
            .flow
            .register(Some("sid"), "aB3d", AccountFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScribeError::CaptchaMismatch));
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let h = harness();
        seed_challenge(&h.store, "sid", "aB3d").await;

        h.flow.register(Some("sid"), "aB3d", alice()).await.unwrap();
        let err = h
            .flow
            .register(Some("sid"), "aB3d", alice())
            .await
            .unwrap_err();

        match err {
            ScribeError::Validation(errors) => {
                assert!(errors.contains("username"));
                assert!(errors.contains("telephone"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness();
        seed_challenge(&h.store, "sid", "aB3d").await;
        h.flow.register(Some("sid"), "aB3d", alice()).await.unwrap();

        assert!(!h.flow.accounts.has_dummy_hash());
        let unknown = h.flow.login("nobody", "pw12345").await.unwrap_err();
        // The miss still ran a password verification
        assert!(h.flow.accounts.has_dummy_hash());
        let wrong = h.flow.login("alice", "wrong").await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(unknown.body(), wrong.body());
        assert!(matches!(unknown, ScribeError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_log_in() {
        let h = harness();
        let manager = UserManager::new(h.store.clone());
        manager
            .create_user(
                alice(),
                ExtraFlags {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            h.flow.login("alice", "pw12345").await,
            Err(ScribeError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_refresh_keeps_chain_origin() {
        let h = harness();
        seed_challenge(&h.store, "sid", "aB3d").await;
        let registration = h.flow.register(Some("sid"), "aB3d", alice()).await.unwrap();
        let original = h.tokens.verify(&registration.token.token).unwrap();

        let refreshed = h
            .flow
            .refresh_at(&registration.token.token, original.iat + 100)
            .await
            .unwrap();
        let claims = h.tokens.verify_at(&refreshed.token, original.iat + 100).unwrap();

        assert_eq!(claims.user_id, original.user_id);
        assert_eq!(claims.orig_iat, original.orig_iat);
        assert_eq!(claims.exp, original.iat + 100 + 300);
    }

    #[tokio::test]
    async fn test_refresh_rejects_expired_and_orphaned_tokens() {
        let h = harness();
        seed_challenge(&h.store, "sid", "aB3d").await;
        let registration = h.flow.register(Some("sid"), "aB3d", alice()).await.unwrap();

        assert!(matches!(
            h.flow
                .refresh_at(&registration.token.token, registration.token.expires_at + 1)
                .await,
            Err(ScribeError::TokenExpired)
        ));

        let mut ghost = registration.user.clone();
        ghost.id = 999;
        let orphan = h.tokens.mint(&ghost).unwrap();
        assert!(matches!(
            h.flow.refresh(&orphan.token).await,
            Err(ScribeError::TokenInvalid)
        ));
    }
}
