//! Response DTOs
//!
//! Data structures for API response bodies.

use serde::Serialize;

use crate::domain::{EndReason, PresenceSession};

/// Current online count (`GET /api/v1/presence`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresenceCountResponse {
    pub count: u64,
}

/// Session record as exposed to admin views
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub active: bool,
    pub started_at: String,
    pub last_seen_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    pub remote_address: Option<String>,
    pub client_agent: Option<String>,
}

impl From<PresenceSession> for SessionResponse {
    fn from(session: PresenceSession) -> Self {
        Self {
            session_id: session.session_id.to_string(),
            active: session.active,
            started_at: session.started_at.to_rfc3339(),
            last_seen_at: session.last_seen_at.to_rfc3339(),
            ended_at: session.ended_at.map(|t| t.to_rfc3339()),
            end_reason: session.end_reason,
            remote_address: session.remote_address,
            client_agent: session.client_agent,
        }
    }
}
