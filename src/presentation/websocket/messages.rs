//! WebSocket Message Types
//!
//! Op-code framed JSON messages exchanged on the presence gateway.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::application::services::PresenceUpdate;
use crate::domain::SessionId;

/// Dispatch event name carried by presence updates
pub const PRESENCE_UPDATE: &str = "PRESENCE_UPDATE";

/// Gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatch (server -> client)
    Dispatch = 0,
    /// Heartbeat (client -> server)
    Heartbeat = 1,
    /// Ask for the current count (client -> server)
    RequestPresence = 3,
    /// Hello (server -> client)
    Hello = 10,
    /// Heartbeat ACK (server -> client)
    HeartbeatAck = 11,
}

impl OpCode {
    pub fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            3 => Some(Self::RequestPresence),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }
}

/// Incoming gateway message
#[derive(Debug, Deserialize)]
pub struct GatewayReceive {
    pub op: u8,
    #[serde(default)]
    pub d: Option<serde_json::Value>,
}

/// Outgoing gateway message
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySend {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewaySend {
    /// Hello (op 10), first frame on every connection.
    pub fn hello(session_id: SessionId, heartbeat_interval: u64) -> Self {
        Self {
            op: OpCode::Hello as u8,
            d: Some(json!({
                "session_id": session_id.to_string(),
                "heartbeat_interval": heartbeat_interval,
            })),
            s: None,
            t: None,
        }
    }

    pub fn heartbeat_ack() -> Self {
        Self {
            op: OpCode::HeartbeatAck as u8,
            d: None,
            s: None,
            t: None,
        }
    }

    /// Presence dispatch; `d` is `{ "count": N }`.
    pub fn presence(update: PresenceUpdate) -> Self {
        Self {
            op: OpCode::Dispatch as u8,
            d: Some(json!({ "count": update.count })),
            s: Some(update.sequence),
            t: Some(PRESENCE_UPDATE.to_string()),
        }
    }

    /// Serialize for a text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
