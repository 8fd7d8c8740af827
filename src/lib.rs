//! # Presence Server Library
//!
//! This crate tracks how many visitors are currently connected and pushes
//! the count to each of them in real time:
//! - WebSocket gateway with heartbeats and presence dispatches
//! - Session store (in-memory, or PostgreSQL for audit history)
//! - Background sweeper that expires sessions whose client vanished
//! - Read-only HTTP API, health probes, and Prometheus metrics
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Session entity, session ID, and the store trait
//! - **Application Layer**: Presence lifecycle, broadcaster, sweeper, DTOs
//! - **Infrastructure Layer**: Store implementations, database pool, metrics
//! - **Presentation Layer**: HTTP handlers and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! presence_server/
//! +-- config/         Configuration management
//! +-- domain/         Session entity, value objects, and store trait
//! +-- application/    Presence services and DTOs
//! +-- infrastructure/ Session stores, database, and metrics
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
