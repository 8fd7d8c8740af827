//! Presence Broadcaster
//!
//! Recomputes the active count from the session store and fans it out to
//! every subscribed connection.
//!
//! Each connection owns a bounded queue drained by its own writer task.
//! Fan-out only ever calls `try_send`, so a slow or dead client costs one
//! failed enqueue and never delays anyone else. Counting and enqueueing
//! happen under one lock, which gives every connection its updates in
//! sequence order.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use crate::domain::{SessionId, SessionStore};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Count pushed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresenceUpdate {
    /// Active sessions at the instant the update was computed
    pub count: u64,
    /// Increases by one for every computed update
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct BroadcastState {
    sequence: u64,
    last_count: Option<u64>,
}

/// Fan-out of presence counts to connected clients.
pub struct PresenceBroadcaster {
    store: Arc<dyn SessionStore>,
    subscribers: DashMap<SessionId, mpsc::Sender<PresenceUpdate>>,
    state: Mutex<BroadcastState>,
    buffer: usize,
}

impl PresenceBroadcaster {
    pub fn new(store: Arc<dyn SessionStore>, buffer: usize) -> Self {
        Self {
            store,
            subscribers: DashMap::new(),
            state: Mutex::new(BroadcastState::default()),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection and return the receiving end of its queue.
    ///
    /// Re-subscribing an ID replaces (and closes) the previous queue.
    pub fn subscribe(&self, session_id: SessionId) -> mpsc::Receiver<PresenceUpdate> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.insert(session_id, tx);
        rx
    }

    /// Drop a connection's queue. The writer task sees the channel close.
    pub fn unsubscribe(&self, session_id: &SessionId) -> bool {
        self.subscribers.remove(session_id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Count included in the most recent broadcast, if any.
    pub async fn last_count(&self) -> Option<u64> {
        self.state.lock().await.last_count
    }

    /// Recompute the count and deliver it to every subscriber.
    pub async fn broadcast(&self) -> Result<PresenceUpdate, AppError> {
        let mut state = self.state.lock().await;
        let count = self.store.count_active().await?;
        let update = Self::next_update(&mut state, count);
        self.fan_out(update);
        Ok(update)
    }

    /// Like [`broadcast`](Self::broadcast), but only delivers when the count
    /// differs from the last broadcast one.
    pub async fn broadcast_if_changed(&self) -> Result<Option<PresenceUpdate>, AppError> {
        let mut state = self.state.lock().await;
        let count = self.store.count_active().await?;
        if state.last_count == Some(count) {
            return Ok(None);
        }
        let update = Self::next_update(&mut state, count);
        self.fan_out(update);
        Ok(Some(update))
    }

    /// Deliver the current count to a single subscriber.
    ///
    /// Returns false if the session is not subscribed or its queue is full.
    pub async fn send_current(&self, session_id: &SessionId) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let Some(sender) = self.subscribers.get(session_id).map(|s| s.value().clone()) else {
            return Ok(false);
        };
        let count = self.store.count_active().await?;
        // Only this connection sees it, so last_count keeps tracking what everyone saw
        state.sequence += 1;
        let update = PresenceUpdate {
            count,
            sequence: state.sequence,
        };
        Ok(sender.try_send(update).is_ok())
    }

    fn next_update(state: &mut BroadcastState, count: u64) -> PresenceUpdate {
        state.sequence += 1;
        state.last_count = Some(count);
        metrics::set_active_sessions(count);
        PresenceUpdate {
            count,
            sequence: state.sequence,
        }
    }

    fn fan_out(&self, update: PresenceUpdate) {
        let mut closed = Vec::new();
        let mut delivered = 0usize;

        for entry in self.subscribers.iter() {
            match entry.value().try_send(update) {
                Ok(()) => {
                    delivered += 1;
                    metrics::record_delivery("sent");
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // The client will pick up the next update instead
                    metrics::record_delivery("dropped");
                    tracing::warn!(
                        session_id = %entry.key(),
                        count = update.count,
                        "Presence update dropped, outbound queue full"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    metrics::record_delivery("closed");
                    closed.push(*entry.key());
                }
            }
        }

        for session_id in closed {
            tracing::debug!(session_id = %session_id, "Removing closed subscriber");
            self.subscribers.remove(&session_id);
        }

        tracing::debug!(
            count = update.count,
            sequence = update.sequence,
            delivered,
            "Presence broadcast"
        );
    }
}
