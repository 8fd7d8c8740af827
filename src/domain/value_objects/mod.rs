//! # Domain Value Objects
//!
//! Immutable value types that represent domain concepts without identity.
//!
//! ## Value Objects
//!
//! - **SessionId**: Random identifier minted for every accepted connection

mod session_id;

pub use session_id::*;
