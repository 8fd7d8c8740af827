//! Presence Session entity and store trait.
//!
//! A session represents one live browser connection. Records are created
//! when the gateway accepts a connection and go inactive exactly once, either
//! on an explicit disconnect or when the reconciliation sweeper finds them
//! stale. Inactive records are kept for audit until pruned.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SessionId;
use crate::shared::error::AppError;

/// Why a session went inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// The transport reported a close or error.
    Disconnected,
    /// The sweeper found no liveness signal within the staleness threshold.
    Expired,
    /// Left active by a previous process and closed at startup.
    Orphaned,
}

impl EndReason {
    /// Convert from database string representation.
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "disconnected" => Some(Self::Disconnected),
            "expired" => Some(Self::Expired),
            "orphaned" => Some(Self::Orphaned),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Expired => "expired",
            Self::Orphaned => "orphaned",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Informational metadata captured when a connection is accepted.
///
/// Never used for identity or deduplication: two tabs from the same browser
/// are two sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub remote_address: Option<String>,
    pub client_agent: Option<String>,
}

/// Server-side presence record for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSession {
    pub session_id: SessionId,

    /// Peer address at connect time
    pub remote_address: Option<String>,

    /// Raw user agent string at connect time
    pub client_agent: Option<String>,

    pub started_at: DateTime<Utc>,

    /// Refreshed by every liveness signal; never moves backwards
    pub last_seen_at: DateTime<Utc>,

    pub active: bool,

    /// When the session went inactive (None while active)
    pub ended_at: Option<DateTime<Utc>>,

    pub end_reason: Option<EndReason>,
}

impl PresenceSession {
    /// Create an active session for a freshly accepted connection.
    pub fn open(session_id: SessionId, info: ConnectionInfo, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            remote_address: info.remote_address,
            client_agent: info.client_agent,
            started_at: now,
            last_seen_at: now,
            active: true,
            ended_at: None,
            end_reason: None,
        }
    }

    /// Record a liveness signal. Returns false if the session is inactive.
    pub fn touch(&mut self, at: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if at > self.last_seen_at {
            self.last_seen_at = at;
        }
        true
    }

    /// Mark the session inactive. Returns false if it already was.
    pub fn end(&mut self, at: DateTime<Utc>, reason: EndReason) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        if at > self.last_seen_at {
            self.last_seen_at = at;
        }
        self.ended_at = Some(at);
        self.end_reason = Some(reason);
        true
    }

    /// Whether an active session has been silent since before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.active && self.last_seen_at < cutoff
    }
}

/// Store trait for presence session records.
///
/// Every mutation touches exactly one record and only applies to records
/// that are still active, so a record can never be revived.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. Fails with `Conflict` if the ID already exists.
    async fn create(&self, session: &PresenceSession) -> Result<(), AppError>;

    /// Find a session by ID, active or not.
    async fn find_by_id(&self, id: SessionId) -> Result<Option<PresenceSession>, AppError>;

    /// Refresh `last_seen_at` of an active session.
    ///
    /// Returns false when the ID is unknown or the session is inactive.
    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Mark an active session inactive.
    ///
    /// Returns false when the ID is unknown or the session is already inactive.
    async fn deactivate(
        &self,
        id: SessionId,
        at: DateTime<Utc>,
        reason: EndReason,
    ) -> Result<bool, AppError>;

    /// Count sessions with `active == true`.
    async fn count_active(&self) -> Result<u64, AppError>;

    /// Find active sessions whose `last_seen_at` is before `cutoff`.
    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionId>, AppError>;

    /// Expire a session if it is still active and still older than `cutoff`.
    async fn expire(
        &self,
        id: SessionId,
        cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Deactivate every active session left over from a previous process.
    async fn close_orphaned(&self, at: DateTime<Utc>) -> Result<u64, AppError>;

    /// Delete inactive sessions that ended before `before`.
    async fn prune_inactive(&self, before: DateTime<Utc>) -> Result<u64, AppError>;
}
