//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use chrono::{DateTime, Utc};
use tower::ServiceExt;

use presence_server::config::{
    CorsSettings, DatabaseSettings, PresenceSettings, ServerSettings, Settings, StoreBackend,
    StoreSettings, WebSocketSettings,
};
use presence_server::domain::{EndReason, PresenceSession, SessionId, SessionStore};
use presence_server::infrastructure::repositories::InMemorySessionStore;
use presence_server::presentation::http::routes;
use presence_server::shared::error::AppError;
use presence_server::startup::{AppState, Application};

/// Settings suitable for tests: in-memory store, ephemeral port
pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        store: StoreSettings {
            backend: StoreBackend::Memory,
        },
        database: DatabaseSettings {
            url: None,
            max_connections: 1,
            min_connections: 0,
            acquire_timeout: 1,
        },
        presence: PresenceSettings {
            sweep_interval_secs: 60,
            staleness_threshold_secs: 300,
            retention_secs: None,
            outbound_buffer: 32,
        },
        cors: CorsSettings {
            allowed_origins: vec!["http://localhost:3000".into()],
        },
        websocket: WebSocketSettings {
            max_message_size: 4096,
            max_frame_size: 4096,
            heartbeat_interval_ms: 30000,
        },
        environment: "test".into(),
    }
}

/// Test application builder
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Create a new test application backed by a fresh in-memory store
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemorySessionStore::new()))
    }

    /// Create a test application around a specific store
    pub fn with_store(store: Arc<dyn SessionStore>) -> Self {
        let state = AppState::new(test_settings(), store);
        Self {
            router: routes::create_router(state.clone()),
            state,
        }
    }

    /// Make a GET request to the application
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// Make a GET request and decode the JSON body
    pub async fn get_json(&self, uri: &str) -> (axum::http::StatusCode, serde_json::Value) {
        let response = self.get(uri).await;
        let status = response.status();
        let body = body_bytes(response).await;
        let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, value)
    }
}

pub async fn body_bytes(response: axum::response::Response) -> axum::body::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

/// A running server on an ephemeral port
pub struct SpawnedApp {
    pub addr: SocketAddr,
    pub state: AppState,
}

impl SpawnedApp {
    pub fn gateway_url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }
}

/// Start the full server, sweeper included, in the background
pub async fn spawn_app() -> SpawnedApp {
    let state = AppState::new(test_settings(), Arc::new(InMemorySessionStore::new()));
    let application = Application::bind(state).await.unwrap();
    let addr = application.local_addr().unwrap();
    let state = application.state().clone();

    tokio::spawn(application.run_until_stopped());

    SpawnedApp { addr, state }
}

/// Store whose every operation fails, for outage scenarios
#[derive(Debug, Default)]
pub struct FailingStore;

fn outage() -> AppError {
    AppError::Store("store offline".into())
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn create(&self, _session: &PresenceSession) -> Result<(), AppError> {
        Err(outage())
    }

    async fn find_by_id(&self, _id: SessionId) -> Result<Option<PresenceSession>, AppError> {
        Err(outage())
    }

    async fn touch(&self, _id: SessionId, _at: DateTime<Utc>) -> Result<bool, AppError> {
        Err(outage())
    }

    async fn deactivate(
        &self,
        _id: SessionId,
        _at: DateTime<Utc>,
        _reason: EndReason,
    ) -> Result<bool, AppError> {
        Err(outage())
    }

    async fn count_active(&self) -> Result<u64, AppError> {
        Err(outage())
    }

    async fn find_stale(&self, _cutoff: DateTime<Utc>) -> Result<Vec<SessionId>, AppError> {
        Err(outage())
    }

    async fn expire(
        &self,
        _id: SessionId,
        _cutoff: DateTime<Utc>,
        _at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        Err(outage())
    }

    async fn close_orphaned(&self, _at: DateTime<Utc>) -> Result<u64, AppError> {
        Err(outage())
    }

    async fn prune_inactive(&self, _before: DateTime<Utc>) -> Result<u64, AppError> {
        Err(outage())
    }
}
