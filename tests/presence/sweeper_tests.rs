//! Reconciliation sweeper scenarios

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use presence_server::application::services::SweepPhase;
use presence_server::domain::{
    ConnectionInfo, EndReason, PresenceSession, SessionId, SessionStore,
};
use presence_server::infrastructure::repositories::InMemorySessionStore;
use presence_server::startup::AppState;

use crate::common::{test_settings, FailingStore};

fn state() -> (AppState, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    (AppState::new(test_settings(), store.clone()), store)
}

/// Insert an active session whose last liveness signal was `age` ago
async fn seed(store: &InMemorySessionStore, age: Duration) -> SessionId {
    let session = PresenceSession::open(
        SessionId::new(),
        ConnectionInfo::default(),
        Utc::now() - age,
    );
    store.create(&session).await.unwrap();
    session.session_id
}

#[tokio::test]
async fn test_sweep_expires_stale_and_keeps_fresh() {
    let (state, store) = state();
    let stale = seed(&store, Duration::seconds(400)).await;
    let fresh = seed(&store, Duration::seconds(10)).await;
    let mut stale_rx = state.presence.broadcaster().subscribe(stale);
    let mut fresh_rx = state.presence.broadcaster().subscribe(fresh);

    let report = state.sweeper.sweep_at(Utc::now()).await.unwrap();

    assert_eq!(report.stale_found, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.failed, 0);
    assert!(report.broadcast);

    let record = store.find_by_id(stale).await.unwrap().unwrap();
    assert!(!record.active);
    assert_eq!(record.end_reason, Some(EndReason::Expired));
    assert!(store.find_by_id(fresh).await.unwrap().unwrap().active);

    // Expired connection is dropped from fan-out, survivor hears the new count
    assert!(stale_rx.recv().await.is_none());
    assert_eq!(fresh_rx.try_recv().unwrap().count, 1);
    assert_eq!(state.sweeper.phase(), SweepPhase::Idle);
}

#[tokio::test]
async fn test_heartbeat_before_sweep_keeps_session() {
    let (state, store) = state();
    let id = seed(&store, Duration::seconds(400)).await;
    let now = Utc::now();

    assert!(state.presence.heartbeat(id).await);
    let report = state.sweeper.sweep_at(now).await.unwrap();

    assert_eq!(report.expired, 0);
    assert!(store.find_by_id(id).await.unwrap().unwrap().active);
}

#[tokio::test]
async fn test_sweep_without_count_change_skips_broadcast() {
    let (state, _store) = state();
    let mut conn = state.presence.connect(ConnectionInfo::default()).await.unwrap();
    while conn.updates.try_recv().is_ok() {}

    let report = state.sweeper.sweep_at(Utc::now()).await.unwrap();

    assert_eq!(report.expired, 0);
    assert!(!report.broadcast);
    assert!(conn.updates.try_recv().is_err());
}

#[tokio::test]
async fn test_session_exactly_at_threshold_is_not_stale() {
    let (state, store) = state();
    let now = Utc::now();
    let session = PresenceSession::open(
        SessionId::new(),
        ConnectionInfo::default(),
        now - Duration::seconds(300),
    );
    store.create(&session).await.unwrap();

    let report = state.sweeper.sweep_at(now).await.unwrap();

    assert_eq!(report.stale_found, 0);
    assert!(store.find_by_id(session.session_id).await.unwrap().unwrap().active);
}

#[tokio::test]
async fn test_retention_prunes_old_inactive_records() {
    let store = Arc::new(InMemorySessionStore::new());
    let mut settings = test_settings();
    settings.presence.retention_secs = Some(3600);
    let state = AppState::new(settings, store.clone());

    let now = Utc::now();
    let old = seed(&store, Duration::hours(3)).await;
    store
        .deactivate(old, now - Duration::hours(2), EndReason::Disconnected)
        .await
        .unwrap();
    let recent = seed(&store, Duration::minutes(20)).await;
    store
        .deactivate(recent, now - Duration::minutes(10), EndReason::Disconnected)
        .await
        .unwrap();

    let report = state.sweeper.sweep_at(now).await.unwrap();

    assert_eq!(report.pruned, 1);
    assert!(store.find_by_id(old).await.unwrap().is_none());
    assert!(store.find_by_id(recent).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_scan_aborts_cycle_and_resets_phase() {
    let state = AppState::new(test_settings(), Arc::new(FailingStore));

    assert!(state.sweeper.sweep_at(Utc::now()).await.is_err());
    assert_eq!(state.sweeper.phase(), SweepPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_expires_within_one_interval() {
    let store = Arc::new(InMemorySessionStore::new());
    let mut settings = test_settings();
    settings.presence.sweep_interval_secs = 1;
    let state = AppState::new(settings, store.clone());
    let id = seed(&store, Duration::seconds(400)).await;

    let handle = state.sweeper.clone().spawn();

    // First tick is skipped; the first cycle runs one interval in
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    assert!(store.find_by_id(id).await.unwrap().unwrap().active);

    tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
    let record = store.find_by_id(id).await.unwrap().unwrap();
    assert!(!record.active);
    assert_eq!(record.end_reason, Some(EndReason::Expired));
    assert_eq!(state.sweeper.phase(), SweepPhase::Idle);

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_survives_failed_cycles() {
    let mut settings = test_settings();
    settings.presence.sweep_interval_secs = 1;
    let state = AppState::new(settings, Arc::new(FailingStore));

    let handle = state.sweeper.clone().spawn();

    tokio::time::sleep(std::time::Duration::from_millis(3500)).await;
    assert!(!handle.is_finished());
    assert_eq!(state.sweeper.phase(), SweepPhase::Idle);

    handle.abort();
}
