//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;

use crate::application::services::{
    PresenceBroadcaster, PresenceService, ReconciliationSweeper, SweepConfig,
};
use crate::config::{Settings, StoreBackend};
use crate::domain::SessionStore;
use crate::infrastructure::database;
use crate::infrastructure::repositories::{InMemorySessionStore, PgSessionStore};
use crate::presentation::http::{handlers, routes};
use crate::presentation::middleware::{cors, logging};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub presence: Arc<PresenceService>,
    pub sweeper: Arc<ReconciliationSweeper>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the presence components around an already-opened store
    pub fn new(settings: Settings, store: Arc<dyn SessionStore>) -> Self {
        let broadcaster = Arc::new(PresenceBroadcaster::new(
            store.clone(),
            settings.presence.outbound_buffer,
        ));
        let presence = Arc::new(PresenceService::new(store.clone(), broadcaster.clone()));
        let sweeper = Arc::new(ReconciliationSweeper::new(
            store,
            broadcaster,
            SweepConfig::from(&settings.presence),
        ));

        Self {
            presence,
            sweeper,
            settings: Arc::new(settings),
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let store = open_store(&settings).await?;

        // Anything still active belongs to a previous process
        let orphaned = store
            .close_orphaned(chrono::Utc::now())
            .await
            .context("failed to close orphaned sessions")?;
        if orphaned > 0 {
            tracing::info!(orphaned, "Closed sessions left over from a previous run");
        }

        handlers::health::init_server_start();

        let state = AppState::new(settings, store);

        Self::bind(state).await
    }

    /// Bind a listener for an assembled state
    pub async fn bind(state: AppState) -> Result<Self> {
        let settings = state.settings.clone();

        // Build router with middleware
        let router = routes::create_router(state.clone())
            .layer(logging::create_trace_layer())
            .layer(cors::create_cors_layer(&settings.cors));

        let listener = TcpListener::bind(settings.server_addr())
            .await
            .with_context(|| format!("failed to bind {}", settings.server_addr()))?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router,
            state,
        })
    }

    /// Run the server and the reconciliation sweeper until a shutdown signal
    pub async fn run_until_stopped(self) -> Result<()> {
        let sweeper = self.state.sweeper.clone().spawn();

        let served = axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        sweeper.abort();
        tracing::info!("Server stopped");

        served?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn SessionStore>> {
    match settings.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory session store");
            Ok(Arc::new(InMemorySessionStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = database::create_pool(&settings.database)
                .await
                .context("failed to create database pool")?;
            tracing::info!("Database connection pool created");

            database::run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            tracing::info!("Database migrations applied");

            Ok(Arc::new(PgSessionStore::new(pool)))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
