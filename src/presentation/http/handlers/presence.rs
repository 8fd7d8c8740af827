//! Presence Handlers
//!
//! Synchronous read access to presence state for reporting and admin views.
//!
//! # Endpoints
//! - `GET /api/v1/presence` - Current online count
//! - `GET /api/v1/presence/sessions/{session_id}` - One session record

use axum::{
    extract::{Path, State},
    Json,
};

use crate::application::dto::{PresenceCountResponse, SessionResponse};
use crate::domain::SessionId;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Current number of active sessions, read from the store
pub async fn get_presence(
    State(state): State<AppState>,
) -> Result<Json<PresenceCountResponse>, AppError> {
    let count = state.presence.active_count().await?;
    Ok(Json(PresenceCountResponse { count }))
}

/// Look up a single session record
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session_id: SessionId = session_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid session ID".into()))?;

    let session = state
        .presence
        .find_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".into()))?;

    Ok(Json(session.into()))
}
