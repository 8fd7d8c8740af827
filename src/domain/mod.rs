//! # Domain Layer
//!
//! The domain layer contains the core presence model.
//! It is independent of any external frameworks or infrastructure concerns.
//!
//! ## Structure
//!
//! - **entities**: Presence sessions and the store contract
//! - **value_objects**: Immutable value types (SessionId)
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - The online count is always derived from session records
//! - Store traits define data access contracts

pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use value_objects::*;
