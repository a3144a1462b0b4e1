//! # Parley Server
//!
//! Realtime presence and two-party conversation fan-out server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parley
//!
//! # Run with environment variables
//! PARLEY_PORT=8080 PARLEY_HOST=0.0.0.0 parley
//! ```
//!
//! Dev-mode users (and their credential tokens) are seeded from the
//! `[[users]]` tables in `parley.toml`.

mod config;
mod events;
mod handlers;
mod metrics;

use anyhow::Result;
use parley_protocol::PublicProfile;
use parley_store::{MemoryDirectory, MemoryStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Seed the dev-mode collaborators
    let directory = Arc::new(MemoryDirectory::new());
    for user in &config.users {
        directory.add_user(
            PublicProfile {
                id: user.id.clone(),
                name: user.name.clone(),
                email: user.email.clone(),
                avatar_url: user.avatar_url.clone(),
            },
            user.token.clone(),
        );
    }
    tracing::info!(users = directory.user_count(), "Seeded user directory");

    let store = Arc::new(MemoryStore::new());

    let state = Arc::new(handlers::AppState::new(
        config,
        directory.clone(),
        directory,
        store,
    ));

    // Start the server
    handlers::run_server(state).await?;

    Ok(())
}
