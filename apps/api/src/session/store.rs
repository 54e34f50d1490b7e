//! Persisted mirror of the live session registry.
//!
//! `finalize` is a conditional UPDATE: only an `active` row can change, and
//! the caller learns whether its write applied. That keeps terminal rows
//! immutable even across process restarts and duplicate webhook deliveries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::SessionStatus;

#[derive(Debug, Clone)]
pub struct NewVoiceSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub interview_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub max_duration_minutes: i64,
    pub questions_count: i64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone)]
pub struct NewVoiceError {
    pub session_id: Uuid,
    pub error_type: &'static str,
    pub message: String,
    pub user_message: String,
    pub should_retry: bool,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &NewVoiceSession) -> Result<(), AppError>;

    /// Writes a terminal transition. Returns false when the row was already
    /// terminal and nothing changed.
    async fn finalize(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        actual_minutes: i64,
        actual_cost: f64,
    ) -> Result<bool, AppError>;

    async fn insert_error(&self, error: &NewVoiceError) -> Result<(), AppError>;
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &NewVoiceSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO voice_sessions
                (id, user_id, interview_id, started_at, max_duration_minutes,
                 questions_count, status, estimated_cost)
            VALUES ($1, $2, $3, $4, $5, $6, 'active', $7)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.interview_id)
        .bind(session.started_at)
        .bind(session.max_duration_minutes)
        .bind(session.questions_count)
        .bind(session.estimated_cost)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finalize(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        actual_minutes: i64,
        actual_cost: f64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE voice_sessions
            SET status = $2,
                actual_duration_minutes = $3,
                actual_cost = $4,
                updated_at = now()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(session_id)
        .bind(status.as_str())
        .bind(actual_minutes)
        .bind(actual_cost)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_error(&self, error: &NewVoiceError) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO voice_errors
                (id, session_id, error_type, message, user_message, should_retry)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(error.session_id)
        .bind(error.error_type)
        .bind(&error.message)
        .bind(&error.user_message)
        .bind(error.should_retry)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// In-memory store (tests)
// ─────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[derive(Default)]
pub struct MemorySessionStore {
    pub inner: tokio::sync::Mutex<MemorySessions>,
}

#[cfg(test)]
#[derive(Default)]
pub struct MemorySessions {
    pub inserted: Vec<NewVoiceSession>,
    pub finalized: Vec<(Uuid, SessionStatus, i64)>,
    pub errors: Vec<NewVoiceError>,
}

#[cfg(test)]
impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn finalize_count(&self, session_id: Uuid) -> usize {
        self.inner
            .lock()
            .await
            .finalized
            .iter()
            .filter(|(id, _, _)| *id == session_id)
            .count()
    }
}

#[cfg(test)]
#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &NewVoiceSession) -> Result<(), AppError> {
        self.inner.lock().await.inserted.push(session.clone());
        Ok(())
    }

    async fn finalize(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        actual_minutes: i64,
        _actual_cost: f64,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        let already = inner.finalized.iter().any(|(id, _, _)| *id == session_id);
        if already {
            return Ok(false);
        }
        inner.finalized.push((session_id, status, actual_minutes));
        Ok(true)
    }

    async fn insert_error(&self, error: &NewVoiceError) -> Result<(), AppError> {
        self.inner.lock().await.errors.push(error.clone());
        Ok(())
    }
}
