//! Application Services
//!
//! Services that coordinate presence operations over the session store.
//!
//! ## Available Services
//!
//! - **PresenceService**: Connect, heartbeat and disconnect handling
//! - **PresenceBroadcaster**: Count recomputation and fan-out to connections
//! - **ReconciliationSweeper**: Periodic expiry of stale sessions

pub mod broadcaster;
pub mod presence_service;
pub mod sweeper;

pub use broadcaster::{PresenceBroadcaster, PresenceUpdate};
pub use presence_service::{PresenceConnection, PresenceService};
pub use sweeper::{ReconciliationSweeper, SweepConfig, SweepPhase, SweepReport};
