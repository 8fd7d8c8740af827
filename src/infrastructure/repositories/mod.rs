//! Store Implementations
//!
//! Concrete implementations of the `SessionStore` trait defined in the
//! domain layer.
//!
//! ## Available Stores
//!
//! - **InMemorySessionStore** - DashMap store for a single process (default)
//! - **PgSessionStore** - PostgreSQL `presence_sessions` table, kept for audit
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use presence_server::domain::SessionStore;
//! use presence_server::infrastructure::repositories::{InMemorySessionStore, PgSessionStore};
//!
//! let memory: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
//! let durable: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool));
//! ```

pub mod memory_session_store;
pub mod pg_session_store;

pub use memory_session_store::InMemorySessionStore;
pub use pg_session_store::PgSessionStore;
