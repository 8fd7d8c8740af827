//! WebSocket Connection State

use std::time::{Duration, Instant};

use crate::domain::SessionId;

/// Per-connection bookkeeping kept by the read loop
#[derive(Debug)]
pub struct ConnectionState {
    pub session_id: SessionId,
    pub connected_at: Instant,
    pub heartbeats: u64,
    pub last_heartbeat: Option<Instant>,
}

impl ConnectionState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            connected_at: Instant::now(),
            heartbeats: 0,
            last_heartbeat: None,
        }
    }

    pub fn heartbeat(&mut self) {
        self.heartbeats += 1;
        self.last_heartbeat = Some(Instant::now());
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
