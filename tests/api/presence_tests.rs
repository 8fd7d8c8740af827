//! Presence REST endpoint tests

use std::sync::Arc;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;

use presence_server::domain::{ConnectionInfo, SessionId};

use crate::common::{FailingStore, TestApp};

#[tokio::test]
async fn test_count_starts_at_zero() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/api/v1/presence").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "count": 0 }));
}

#[tokio::test]
async fn test_count_follows_connects_and_disconnects() {
    let app = TestApp::new();
    let a = app.state.presence.connect(ConnectionInfo::default()).await.unwrap();
    let _b = app.state.presence.connect(ConnectionInfo::default()).await.unwrap();

    let (_, body) = app.get_json("/api/v1/presence").await;
    assert_eq!(body["count"], 2);

    app.state.presence.disconnect(a.session_id).await;

    let (_, body) = app.get_json("/api/v1/presence").await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_get_session_returns_record() {
    let app = TestApp::new();
    let info = ConnectionInfo {
        remote_address: Some("203.0.113.9".into()),
        client_agent: Some("curl/8.0".into()),
    };
    let conn = app.state.presence.connect(info).await.unwrap();

    let (status, body) = app
        .get_json(&format!("/api/v1/presence/sessions/{}", conn.session_id))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], conn.session_id.to_string());
    assert_eq!(body["active"], true);
    assert_eq!(body["remote_address"], "203.0.113.9");
    assert_eq!(body["client_agent"], "curl/8.0");
    assert!(body.get("end_reason").is_none());
}

#[tokio::test]
async fn test_get_session_after_disconnect_shows_end_reason() {
    let app = TestApp::new();
    let conn = app.state.presence.connect(ConnectionInfo::default()).await.unwrap();
    app.state.presence.disconnect(conn.session_id).await;

    let (status, body) = app
        .get_json(&format!("/api/v1/presence/sessions/{}", conn.session_id))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);
    assert_eq!(body["end_reason"], "disconnected");
    assert!(body["ended_at"].is_string());
}

#[tokio::test]
async fn test_get_unknown_session_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app
        .get_json(&format!("/api/v1/presence/sessions/{}", SessionId::new()))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 10001);
}

#[tokio::test]
async fn test_get_session_with_malformed_id_is_bad_request() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/api/v1/presence/sessions/not-a-uuid").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 10002);
}

#[tokio::test]
async fn test_count_fails_when_store_fails() {
    let app = TestApp::with_store(Arc::new(FailingStore));
    let (status, body) = app.get_json("/api/v1/presence").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], 10000);
}
