//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Session stores (in-memory and PostgreSQL)
//! - Database pool and migrations
//! - Prometheus metrics

pub mod database;
pub mod metrics;
pub mod repositories;
