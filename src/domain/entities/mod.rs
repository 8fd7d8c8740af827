//! # Domain Entities
//!
//! Core domain entities of the presence tracker.
//!
//! ## Entities
//!
//! - **PresenceSession**: One live browser connection and its liveness state
//!
//! ## Store Traits
//!
//! Each entity has an associated store trait defining data access operations.
//! These traits are implemented in the infrastructure layer, following the
//! dependency inversion principle.

mod session;

pub use session::{ConnectionInfo, EndReason, PresenceSession, SessionStore};

#[cfg(test)]
pub use session::MockSessionStore;
