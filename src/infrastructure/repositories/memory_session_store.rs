//! In-Memory Session Store
//!
//! DashMap-backed implementation of the SessionStore trait. This is the
//! default backend for a single-process deployment.
//!
//! Each mutation holds the write lock of exactly one shard for exactly one
//! record, so connect/heartbeat/disconnect/expiry on different sessions never
//! serialize against each other. Counting walks the shards under read locks;
//! a record is seen either before or after any in-flight mutation, never
//! half-applied and never twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::{EndReason, PresenceSession, SessionId, SessionStore};
use crate::shared::error::AppError;

/// In-process session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, PresenceSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records held, active or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &PresenceSession) -> Result<(), AppError> {
        match self.sessions.entry(session.session_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "session {} already exists",
                session.session_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<PresenceSession>, AppError> {
        Ok(self.sessions.get(&id).map(|s| s.value().clone()))
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<bool, AppError> {
        Ok(self
            .sessions
            .get_mut(&id)
            .map(|mut s| s.touch(at))
            .unwrap_or(false))
    }

    async fn deactivate(
        &self,
        id: SessionId,
        at: DateTime<Utc>,
        reason: EndReason,
    ) -> Result<bool, AppError> {
        Ok(self
            .sessions
            .get_mut(&id)
            .map(|mut s| s.end(at, reason))
            .unwrap_or(false))
    }

    async fn count_active(&self) -> Result<u64, AppError> {
        Ok(self.sessions.iter().filter(|s| s.active).count() as u64)
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionId>, AppError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.is_stale(cutoff))
            .map(|s| *s.key())
            .collect())
    }

    async fn expire(
        &self,
        id: SessionId,
        cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // Re-check under the shard lock: a heartbeat may have landed since the scan
        Ok(match self.sessions.get_mut(&id) {
            Some(mut s) if s.is_stale(cutoff) => s.end(at, EndReason::Expired),
            _ => false,
        })
    }

    async fn close_orphaned(&self, at: DateTime<Utc>) -> Result<u64, AppError> {
        let mut closed = 0;
        for mut s in self.sessions.iter_mut() {
            if s.end(at, EndReason::Orphaned) {
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn prune_inactive(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let start = self.sessions.len();
        self.sessions
            .retain(|_, s| s.active || s.ended_at.map_or(true, |ended| ended >= before));
        Ok(start.saturating_sub(self.sessions.len()) as u64)
    }
}
