//! Connect, heartbeat, disconnect, and broadcast ordering

use std::sync::Arc;

use pretty_assertions::assert_eq;

use presence_server::domain::{ConnectionInfo, EndReason, SessionId, SessionStore};
use presence_server::infrastructure::repositories::InMemorySessionStore;
use presence_server::startup::AppState;

use crate::common::{test_settings, FailingStore};

fn state() -> (AppState, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    (AppState::new(test_settings(), store.clone()), store)
}

#[tokio::test]
async fn test_connect_broadcasts_to_everyone_including_newcomer() {
    let (state, _store) = state();

    let mut a = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    let first = a.updates.try_recv().unwrap();
    assert_eq!(first.count, 1);

    let mut b = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    let a_second = a.updates.try_recv().unwrap();
    let b_first = b.updates.try_recv().unwrap();

    assert_eq!(a_second.count, 2);
    assert_eq!(a_second, b_first);
    assert!(a_second.sequence > first.sequence);
}

#[tokio::test]
async fn test_disconnect_ends_session_and_notifies_remaining() {
    let (state, store) = state();
    let mut a = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    let mut b = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    while a.updates.try_recv().is_ok() {}
    while b.updates.try_recv().is_ok() {}

    assert!(state.presence.disconnect(b.session_id).await);

    assert_eq!(a.updates.try_recv().unwrap().count, 1);
    // The departed connection's queue is closed, not fed
    assert!(b.updates.recv().await.is_none());

    let record = store.find_by_id(b.session_id).await.unwrap().unwrap();
    assert!(!record.active);
    assert_eq!(record.end_reason, Some(EndReason::Disconnected));
    assert_eq!(state.presence.active_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_second_disconnect_changes_nothing() {
    let (state, _store) = state();
    let mut a = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    let b = state.presence.connect(ConnectionInfo::default()).await.unwrap();

    assert!(state.presence.disconnect(b.session_id).await);
    while a.updates.try_recv().is_ok() {}

    assert!(!state.presence.disconnect(b.session_id).await);
    assert!(a.updates.try_recv().is_err());
}

#[tokio::test]
async fn test_heartbeat_refreshes_without_broadcast() {
    let (state, store) = state();
    let mut a = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    while a.updates.try_recv().is_ok() {}
    let before = store.find_by_id(a.session_id).await.unwrap().unwrap();

    assert!(state.presence.heartbeat(a.session_id).await);

    let after = store.find_by_id(a.session_id).await.unwrap().unwrap();
    assert!(after.last_seen_at >= before.last_seen_at);
    assert!(a.updates.try_recv().is_err());
}

#[tokio::test]
async fn test_heartbeat_for_unknown_or_ended_session_is_ignored() {
    let (state, _store) = state();
    assert!(!state.presence.heartbeat(SessionId::new()).await);

    let a = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    state.presence.disconnect(a.session_id).await;
    assert!(!state.presence.heartbeat(a.session_id).await);
}

#[tokio::test]
async fn test_request_count_answers_only_the_asker() {
    let (state, _store) = state();
    let mut a = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    let mut b = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    let mut last_a = 0;
    while let Ok(update) = a.updates.try_recv() {
        last_a = update.sequence;
    }
    while b.updates.try_recv().is_ok() {}

    state.presence.request_count(a.session_id).await;

    let reply = a.updates.try_recv().unwrap();
    assert_eq!(reply.count, 2);
    assert!(reply.sequence > last_a);
    assert!(b.updates.try_recv().is_err());
}

#[tokio::test]
async fn test_sequences_strictly_increase_per_connection() {
    let (state, _store) = state();
    let mut watcher = state.presence.connect(ConnectionInfo::default()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let presence = state.presence.clone();
        handles.push(tokio::spawn(async move {
            let conn = presence.connect(ConnectionInfo::default()).await.unwrap();
            presence.disconnect(conn.session_id).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut last = 0;
    let mut received = 0;
    while let Ok(update) = watcher.updates.try_recv() {
        assert!(update.sequence > last);
        last = update.sequence;
        received += 1;
    }
    assert!(received > 1);
    assert_eq!(state.presence.active_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_connect_refused_when_store_fails() {
    let state = AppState::new(test_settings(), Arc::new(FailingStore));

    let result = state.presence.connect(ConnectionInfo::default()).await;

    assert!(result.is_err());
    assert_eq!(state.presence.broadcaster().subscriber_count(), 0);
}

#[tokio::test]
async fn test_two_visitors_walkthrough() {
    let (state, store) = state();

    // Two connections open
    let mut s1 = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    let mut s2 = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    let mut s1_last = None;
    while let Ok(update) = s1.updates.try_recv() {
        s1_last = Some(update);
    }
    assert_eq!(s1_last.unwrap().count, 2);
    assert_eq!(s2.updates.try_recv().unwrap().count, 2);

    // Heartbeat is silent
    assert!(state.presence.heartbeat(s1.session_id).await);
    assert!(s1.updates.try_recv().is_err());
    assert!(s2.updates.try_recv().is_err());

    // Clean disconnect reaches the survivor only
    assert!(state.presence.disconnect(s1.session_id).await);
    assert_eq!(s2.updates.try_recv().unwrap().count, 1);
    assert!(s1.updates.recv().await.is_none());

    // A ghost heartbeat changes nothing
    assert!(!state.presence.heartbeat(SessionId::new()).await);
    assert_eq!(state.presence.active_count().await.unwrap(), 1);

    // S2 goes silent past the threshold
    let later = chrono::Utc::now() + chrono::Duration::seconds(301);
    let report = state.sweeper.sweep_at(later).await.unwrap();
    assert_eq!(report.expired, 1);
    assert!(report.broadcast);
    assert_eq!(state.presence.active_count().await.unwrap(), 0);
    assert!(s2.updates.recv().await.is_none());
    assert_eq!(
        store.find_by_id(s2.session_id).await.unwrap().unwrap().end_reason,
        Some(EndReason::Expired)
    );

    // Nothing left to reconcile
    let second = state.sweeper.sweep_at(later).await.unwrap();
    assert_eq!(second.expired, 0);
    assert!(!second.broadcast);
}
