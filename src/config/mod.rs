//! # Configuration Module
//!
//! This module handles application configuration loading and management.
//! Configuration can be loaded from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{environment}.toml)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use presence_server::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Sweeping every {}s", settings.presence.sweep_interval_secs);
//! ```

mod settings;

pub use settings::*;
