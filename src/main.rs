//! # Presence Server
//!
//! A live visitor presence tracker implemented in Rust.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Session store (in-memory or PostgreSQL)
//! - HTTP/WebSocket server and the reconciliation sweeper

use anyhow::Result;
use tracing::info;

use presence_server::config::Settings;
use presence_server::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    presence_server::telemetry::init_tracing();

    info!("Starting Presence Server...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        store = ?settings.store.backend,
        sweep_interval_secs = settings.presence.sweep_interval_secs,
        staleness_threshold_secs = settings.presence.staleness_threshold_secs,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
