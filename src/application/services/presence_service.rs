//! Presence Service
//!
//! Session lifecycle operations driven by the WebSocket gateway: connect,
//! heartbeat, disconnect, plus the synchronous active-count query.
//!
//! Only connect fails loudly. Heartbeat and disconnect swallow store errors
//! after logging them; the sweeper reconciles whatever they failed to write.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use super::broadcaster::{PresenceBroadcaster, PresenceUpdate};
use crate::domain::{ConnectionInfo, EndReason, PresenceSession, SessionId, SessionStore};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// An accepted connection: its session ID and its queue of count updates.
#[derive(Debug)]
pub struct PresenceConnection {
    pub session_id: SessionId,
    pub updates: mpsc::Receiver<PresenceUpdate>,
}

/// Presence lifecycle service.
pub struct PresenceService {
    store: Arc<dyn SessionStore>,
    broadcaster: Arc<PresenceBroadcaster>,
}

impl PresenceService {
    pub fn new(store: Arc<dyn SessionStore>, broadcaster: Arc<PresenceBroadcaster>) -> Self {
        Self { store, broadcaster }
    }

    pub fn broadcaster(&self) -> &Arc<PresenceBroadcaster> {
        &self.broadcaster
    }

    /// Accept a connection: create its session and broadcast the new count.
    ///
    /// # Errors
    ///
    /// Returns the store error if the session cannot be persisted; the
    /// caller must refuse the connection.
    pub async fn connect(&self, info: ConnectionInfo) -> Result<PresenceConnection, AppError> {
        let session_id = SessionId::new();
        let session = PresenceSession::open(session_id, info, Utc::now());

        if let Err(e) = self.store.create(&session).await {
            metrics::record_connection("rejected");
            tracing::warn!(session_id = %session_id, error = %e, "Failed to create presence session");
            return Err(e);
        }
        metrics::record_connection("accepted");

        let updates = self.broadcaster.subscribe(session_id);

        tracing::info!(
            session_id = %session_id,
            remote_address = session.remote_address.as_deref().unwrap_or("-"),
            "Presence session opened"
        );

        self.broadcast("connect").await;

        Ok(PresenceConnection {
            session_id,
            updates,
        })
    }

    /// Refresh a session's last-seen time. Never broadcasts.
    ///
    /// Returns false for unknown or inactive sessions and on store errors.
    pub async fn heartbeat(&self, session_id: SessionId) -> bool {
        match self.store.touch(session_id, Utc::now()).await {
            Ok(true) => {
                tracing::trace!(session_id = %session_id, "Heartbeat recorded");
                true
            }
            Ok(false) => {
                tracing::debug!(session_id = %session_id, "Heartbeat for unknown or inactive session");
                false
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to record heartbeat");
                false
            }
        }
    }

    /// End a session after the transport closed and broadcast the new count.
    ///
    /// Returns false if nothing changed (unknown, already inactive, or a
    /// store error).
    pub async fn disconnect(&self, session_id: SessionId) -> bool {
        self.broadcaster.unsubscribe(&session_id);

        match self
            .store
            .deactivate(session_id, Utc::now(), EndReason::Disconnected)
            .await
        {
            Ok(true) => {
                tracing::info!(session_id = %session_id, "Presence session closed");
                self.broadcast("disconnect").await;
                true
            }
            Ok(false) => {
                tracing::debug!(session_id = %session_id, "Disconnect for unknown or inactive session");
                false
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to close presence session");
                false
            }
        }
    }

    /// Push the current count to one connection, in order with broadcasts.
    pub async fn request_count(&self, session_id: SessionId) {
        match self.broadcaster.send_current(&session_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(session_id = %session_id, "Presence request not delivered");
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to answer presence request");
            }
        }
    }

    /// Current number of active sessions, read straight from the store.
    pub async fn active_count(&self) -> Result<u64, AppError> {
        self.store.count_active().await
    }

    /// Look up a session record.
    pub async fn find_session(&self, session_id: SessionId) -> Result<Option<PresenceSession>, AppError> {
        self.store.find_by_id(session_id).await
    }

    async fn broadcast(&self, trigger: &'static str) {
        if let Err(e) = self.broadcaster.broadcast().await {
            tracing::warn!(trigger, error = %e, "Presence broadcast failed");
        }
    }
}
