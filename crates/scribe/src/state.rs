//! Application state and shared resources.

use anyhow::Result;
use std::sync::Arc;

use crate::accounts::{AuthFlow, UserManager};
use crate::auth::TokenService;
use crate::captcha::{CaptchaGenerator, CaptchaRenderer, CaptchaVerifier};
use crate::config::{AppConfig, StorageBackend};
use crate::store::{ChallengeStore, CredentialStore, MemoryStore, RedisStore, SnippetStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Identity records
    pub users: Arc<dyn CredentialStore>,

    /// Session-keyed CAPTCHA answers
    pub challenges: Arc<dyn ChallengeStore>,

    /// Snippet records
    pub snippets: Arc<dyn SnippetStore>,

    /// User factory and lookups
    pub accounts: Arc<UserManager>,

    /// CAPTCHA generator
    pub captcha_generator: Arc<CaptchaGenerator>,

    /// Bearer token service
    pub tokens: Arc<TokenService>,

    /// Register / login / refresh
    pub auth_flow: Arc<AuthFlow>,
}

impl AppState {
    /// Create new application state, connecting to the configured backend
    pub async fn new(config: AppConfig) -> Result<Self> {
        match config.storage {
            StorageBackend::Redis => {
                // Connection manager handles reconnection
                let store = Arc::new(RedisStore::connect(&config.redis_url).await?);
                tracing::info!(redis_url = %config.redis_url, "Redis connected");
                Ok(Self::with_stores(config, store.clone(), store.clone(), store))
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Ok(Self::in_memory(config))
            }
        }
    }

    /// State over a fresh in-process store
    pub fn in_memory(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(config, store.clone(), store.clone(), store)
    }

    fn with_stores(
        config: AppConfig,
        users: Arc<dyn CredentialStore>,
        challenges: Arc<dyn ChallengeStore>,
        snippets: Arc<dyn SnippetStore>,
    ) -> Self {
        let renderer = CaptchaRenderer::from_font_path(&config.captcha.font_path);
        let captcha_generator = Arc::new(CaptchaGenerator::new(
            renderer,
            config.captcha.challenge_ttl_secs,
            config.captcha.default_length,
            config.captcha.max_length,
        ));
        let captcha_verifier = Arc::new(CaptchaVerifier::new(config.captcha.single_use));
        let tokens = Arc::new(TokenService::new(&config.token_config()));
        let accounts = Arc::new(UserManager::new(users.clone()));
        let auth_flow = Arc::new(AuthFlow::new(
            accounts.clone(),
            challenges.clone(),
            captcha_verifier,
            tokens.clone(),
        ));

        Self {
            config,
            users,
            challenges,
            snippets,
            accounts,
            captcha_generator,
            tokens,
            auth_flow,
        }
    }
}
