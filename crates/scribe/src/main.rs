//! # Scribe - accounts, tokens, and owned snippets
//!
//! Registration is gated by an image CAPTCHA; login (by username or
//! telephone) hands out short-lived signed tokens; snippets are readable by
//! anyone and writable only by their owner.
//!
//! ## Architecture
//! ```text
//! Client → Scribe (axum) → authorization gate → handlers
//!              ↓
//!        Redis or in-memory store
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod accounts;
mod auth;
mod captcha;
mod config;
mod highlight;
mod routes;
mod state;
mod store;

use accounts::{AccountFields, ExtraFlags, validate_account_fields};
use crate::config::{AppConfig, StorageBackend};
use state::AppState;

/// Scribe - captcha-gated accounts and owner-scoped snippets
#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/scribe.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Store backend (overrides config)
    #[arg(long, value_enum)]
    storage: Option<StorageBackend>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Create an administrative account
    CreateSuperuser {
        #[arg(long)]
        username: String,

        #[arg(long)]
        telephone: String,

        #[arg(long)]
        email: String,

        /// Read from the environment when not given
        #[arg(long, env = "SCRIBE_SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up .env before clap reads env-backed flags
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("📜 Starting Scribe v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!(storage = ?config.storage, "📋 Configuration loaded from {}", args.config);

    // Initialize application state
    let state = AppState::new(config.clone()).await?;

    match args.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(config, state).await,
        Command::CreateSuperuser {
            username,
            telephone,
            email,
            password,
        } => {
            let fields = AccountFields {
                telephone,
                email,
                username,
                password,
            };
            create_superuser(&state, fields).await
        }
    }
}

async fn serve(config: AppConfig, state: AppState) -> Result<()> {
    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Scribe listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Scribe shutdown complete");
    Ok(())
}

async fn create_superuser(state: &AppState, fields: AccountFields) -> Result<()> {
    validate_account_fields(&fields).context("Invalid superuser fields")?;

    let user = state
        .accounts
        .create_superuser(fields, ExtraFlags::default())
        .await
        .context("Failed to create superuser")?;

    info!(user_id = user.id, username = %user.username, "✅ Superuser created");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
