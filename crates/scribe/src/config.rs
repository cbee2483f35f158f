//! Configuration management for Scribe.
//!
//! Sources, lowest priority first: built-in defaults, the TOML file (when it
//! exists), `SCRIBE__*` environment variables, then CLI flags.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::TokenConfig;
use scribe_common::constants::{
    CAPTCHA_TTL_SECS, DEFAULT_CAPTCHA_LENGTH, DEFAULT_LISTEN_ADDR, DEFAULT_PAGE_SIZE,
    DEFAULT_REDIS_URL, MAX_CAPTCHA_LENGTH, TOKEN_REFRESH_WINDOW_SECS, TOKEN_TTL_SECS,
};

/// Which store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Redis,
    Memory,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Store backend
    #[serde(default)]
    pub storage: StorageBackend,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// CAPTCHA configuration
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Bearer token configuration
    #[serde(default)]
    pub token: TokenSettings,

    #[serde(default)]
    pub pagination: PaginationConfig,
}

/// CAPTCHA-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Path to font file for CAPTCHA text
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Characters per challenge when the client doesn't ask
    #[serde(default = "default_captcha_length")]
    pub default_length: usize,

    #[serde(default = "default_max_captcha_length")]
    pub max_length: usize,

    /// Challenge validity in seconds
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,

    /// Drop a challenge once it has been answered correctly
    #[serde(default)]
    pub single_use: bool,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            font_path: default_font_path(),
            default_length: default_captcha_length(),
            max_length: default_max_captcha_length(),
            challenge_ttl_secs: default_challenge_ttl(),
            single_use: false,
        }
    }
}

/// Token signing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSettings {
    /// HMAC secret. Generated at startup when empty.
    #[serde(default)]
    pub secret: String,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Token validity in seconds
    #[serde(default = "default_token_ttl")]
    pub ttl_secs: u64,

    /// How long after the first token a chain may keep refreshing
    #[serde(default = "default_refresh_window")]
    pub refresh_window_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: default_issuer(),
            ttl_secs: default_token_ttl(),
            refresh_window_secs: default_refresh_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_font_path() -> String { "assets/fonts/DejaVuSans.ttf".to_string() }
fn default_captcha_length() -> usize { DEFAULT_CAPTCHA_LENGTH }
fn default_max_captcha_length() -> usize { MAX_CAPTCHA_LENGTH }
fn default_challenge_ttl() -> u64 { CAPTCHA_TTL_SECS } // 5 minutes
fn default_issuer() -> String { "scribe".to_string() }
fn default_token_ttl() -> u64 { TOKEN_TTL_SECS }
fn default_refresh_window() -> u64 { TOKEN_REFRESH_WINDOW_SECS } // 7 days
fn default_page_size() -> usize { DEFAULT_PAGE_SIZE }

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl AppConfig {
    /// Load configuration from file and environment, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        if !Path::new(config_path).exists() {
            tracing::warn!(path = config_path, "Config file not found, using defaults");
        }

        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("SCRIBE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to parse config")?;

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(storage) = args.storage {
            config.storage = storage;
        }

        config.finalize()?;
        Ok(config)
    }

    fn finalize(&mut self) -> Result<()> {
        if self.token.secret.is_empty() {
            tracing::warn!("No token secret configured; tokens will not survive a restart");
            self.token.secret = generate_secret();
        }

        anyhow::ensure!(
            (1..=self.captcha.max_length).contains(&self.captcha.default_length),
            "captcha.default_length must be between 1 and captcha.max_length"
        );
        anyhow::ensure!(self.pagination.page_size > 0, "pagination.page_size must be positive");
        Ok(())
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.token.secret.clone(),
            issuer: self.token.issuer.clone(),
            ttl_secs: self.token.ttl_secs,
            refresh_window_secs: self.token.refresh_window_secs,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            storage: StorageBackend::default(),
            request_timeout_secs: default_request_timeout(),
            captcha: CaptchaConfig::default(),
            token: TokenSettings::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Args;
    use clap::Parser;

    fn write_config(name: &str, body: &str) -> String {
        let path = std::env::temp_dir().join(format!("scribe-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_defaults_when_file_missing() {
        let args = Args::parse_from(["scribe"]);
        let config = AppConfig::load("/nonexistent/scribe.toml", &args).unwrap();

        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.captcha.default_length, 4);
        assert_eq!(config.captcha.challenge_ttl_secs, 300);
        assert_eq!(config.token.ttl_secs, 300);
        assert_eq!(config.pagination.page_size, 10);
        assert!(!config.token.secret.is_empty());
    }

    #[test]
    fn test_file_values_and_cli_overrides() {
        let path = write_config(
            "overrides",
            r#"
storage = "memory"
listen_addr = "0.0.0.0:9000"

[captcha]
single_use = true
max_length = 6

[token]
secret = "file-secret"
ttl_secs = 60
"#,
        );
        let args = Args::parse_from(["scribe", "--listen", "127.0.0.1:7000"]);
        let config = AppConfig::load(&path, &args).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.listen_addr, "127.0.0.1:7000");
        assert!(config.captcha.single_use);
        assert_eq!(config.captcha.max_length, 6);
        assert_eq!(config.token_config().secret, "file-secret");
        assert_eq!(config.token_config().ttl_secs, 60);
    }

    #[test]
    fn test_rejects_inconsistent_captcha_lengths() {
        let path = write_config(
            "lengths",
            "[captcha]\ndefault_length = 9\nmax_length = 8\n",
        );
        let args = Args::parse_from(["scribe"]);
        let result = AppConfig::load(&path, &args);
        std::fs::remove_file(&path).ok();

        assert!(result.is_err());
    }
}
