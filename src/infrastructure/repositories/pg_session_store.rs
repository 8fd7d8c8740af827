//! PostgreSQL Session Store
//!
//! PostgreSQL implementation of the SessionStore trait, backed by the
//! `presence_sessions` table. Every statement is a single-row (or
//! single-predicate) write guarded by `active = TRUE`, so concurrent
//! handlers and the sweeper cannot revive or double-end a record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{EndReason, PresenceSession, SessionId, SessionStore};
use crate::shared::error::AppError;

/// Database row representation matching the presence_sessions table schema.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    remote_address: Option<String>,
    client_agent: Option<String>,
    started_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    active: bool,
    ended_at: Option<DateTime<Utc>>,
    end_reason: Option<String>,
}

impl SessionRow {
    /// Convert database row to domain PresenceSession entity.
    fn into_session(self) -> PresenceSession {
        PresenceSession {
            session_id: SessionId::from_uuid(self.session_id),
            remote_address: self.remote_address,
            client_agent: self.client_agent,
            started_at: self.started_at,
            last_seen_at: self.last_seen_at,
            active: self.active,
            ended_at: self.ended_at,
            end_reason: self.end_reason.as_deref().and_then(EndReason::from_db),
        }
    }
}

/// PostgreSQL session store implementation.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Create a new PgSessionStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &PresenceSession) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO presence_sessions (
                session_id, remote_address, client_agent, started_at, last_seen_at, active
            )
            VALUES ($1, $2, $3, $4, $5, TRUE)
            ON CONFLICT (session_id) DO NOTHING
            "#,
        )
        .bind(session.session_id.as_uuid())
        .bind(&session.remote_address)
        .bind(&session.client_agent)
        .bind(session.started_at)
        .bind(session.last_seen_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "session {} already exists",
                session.session_id
            )));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<PresenceSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, remote_address, client_agent, started_at, last_seen_at,
                   active, ended_at, end_reason
            FROM presence_sessions
            WHERE session_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_session()))
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE presence_sessions
            SET last_seen_at = GREATEST(last_seen_at, $2)
            WHERE session_id = $1 AND active = TRUE
            "#,
        )
        .bind(id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate(
        &self,
        id: SessionId,
        at: DateTime<Utc>,
        reason: EndReason,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE presence_sessions
            SET active = FALSE,
                last_seen_at = GREATEST(last_seen_at, $2),
                ended_at = $2,
                end_reason = $3
            WHERE session_id = $1 AND active = TRUE
            "#,
        )
        .bind(id.as_uuid())
        .bind(at)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_active(&self) -> Result<u64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM presence_sessions WHERE active = TRUE")
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionId>, AppError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT session_id FROM presence_sessions
            WHERE active = TRUE AND last_seen_at < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(SessionId::from_uuid).collect())
    }

    async fn expire(
        &self,
        id: SessionId,
        cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE presence_sessions
            SET active = FALSE, ended_at = $3, end_reason = 'expired'
            WHERE session_id = $1 AND active = TRUE AND last_seen_at < $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(cutoff)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn close_orphaned(&self, at: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE presence_sessions
            SET active = FALSE,
                last_seen_at = GREATEST(last_seen_at, $1),
                ended_at = $1,
                end_reason = 'orphaned'
            WHERE active = TRUE
            "#,
        )
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn prune_inactive(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM presence_sessions WHERE active = FALSE AND ended_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
