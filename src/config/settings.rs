//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Session store backend selection
    pub store: StoreSettings,

    /// Database configuration (PostgreSQL, only used by the postgres backend)
    pub database: DatabaseSettings,

    /// Presence tracking (sweep cadence, staleness, retention)
    pub presence: PresenceSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// WebSocket configuration
    pub websocket: WebSocketSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// Which session store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process DashMap store (single process, lost on restart)
    Memory,
    /// PostgreSQL table, kept across restarts for audit
    Postgres,
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Presence tracking configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    /// Seconds between reconciliation sweeps (default: 60)
    pub sweep_interval_secs: u64,

    /// Seconds of silence after which a session is presumed gone (default: 300)
    pub staleness_threshold_secs: u64,

    /// Seconds to keep inactive records before pruning.
    ///
    /// `None` keeps them forever, which only makes sense for the postgres
    /// backend. The memory backend loses its records on restart, so
    /// [`Settings::load`] falls back to [`DEFAULT_MEMORY_RETENTION_SECS`].
    pub retention_secs: Option<u64>,

    /// Per-connection outbound queue capacity (default: 32)
    pub outbound_buffer: usize,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum message size in bytes (default: 4KB)
    pub max_message_size: usize,

    /// Maximum frame size in bytes (default: 4KB)
    pub max_frame_size: usize,

    /// Heartbeat interval advertised to clients in milliseconds (default: 30000)
    pub heartbeat_interval_ms: u64,
}

/// Retention applied to the memory backend when none is configured.
pub const DEFAULT_MEMORY_RETENTION_SECS: u64 = 3600;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if the presence timings are inconsistent.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("store.backend", "memory")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("presence.sweep_interval_secs", 60)?
            .set_default("presence.staleness_threshold_secs", 300)?
            .set_default("presence.outbound_buffer", 32)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            // Presence frames are tiny; anything larger is abuse
            .set_default("websocket.max_message_size", 4096_i64)?
            .set_default("websocket.max_frame_size", 4096_i64)?
            .set_default("websocket.heartbeat_interval_ms", 30000_i64)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__PRESENCE__SWEEP_INTERVAL_SECS=30 -> presence.sweep_interval_secs = 30
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option(
                "server.host",
                std::env::var("SERVER_HOST").ok(),
            )?
            .set_override_option(
                "server.port",
                std::env::var("SERVER_PORT").ok(),
            )?
            .set_override_option(
                "database.url",
                std::env::var("DATABASE_URL").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(|mut settings: Self| {
                settings.apply_backend_defaults();
                settings.validate()?;
                Ok(settings)
            })
    }

    /// Fill in defaults that depend on the chosen store backend.
    ///
    /// In-memory records serve no audit purpose, so they are pruned after
    /// [`DEFAULT_MEMORY_RETENTION_SECS`] unless a retention is configured.
    pub fn apply_backend_defaults(&mut self) {
        if self.store.backend == StoreBackend::Memory && self.presence.retention_secs.is_none() {
            self.presence.retention_secs = Some(DEFAULT_MEMORY_RETENTION_SECS);
        }
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let presence = &self.presence;

        if presence.sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "presence.sweep_interval_secs must be greater than zero".into(),
            ));
        }

        if presence.staleness_threshold_secs == 0 {
            return Err(ConfigError::Message(
                "presence.staleness_threshold_secs must be greater than zero".into(),
            ));
        }

        if presence.outbound_buffer == 0 {
            return Err(ConfigError::Message(
                "presence.outbound_buffer must be greater than zero".into(),
            ));
        }

        // Clients that ping slower than the threshold would be swept while alive
        let threshold_ms = presence.staleness_threshold_secs.saturating_mul(1000);
        if self.websocket.heartbeat_interval_ms >= threshold_ms {
            return Err(ConfigError::Message(format!(
                "websocket.heartbeat_interval_ms ({}) must be shorter than the staleness threshold ({}s)",
                self.websocket.heartbeat_interval_ms, presence.staleness_threshold_secs
            )));
        }

        if self.store.backend == StoreBackend::Postgres && self.database.url.is_none() {
            return Err(ConfigError::Message(
                "database.url (or DATABASE_URL) is required for the postgres store backend".into(),
            ));
        }

        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl PresenceSettings {
    /// Interval between reconciliation sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Maximum silent duration before a session is presumed disconnected.
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    /// How long inactive records are retained, if pruning is enabled.
    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }
}
