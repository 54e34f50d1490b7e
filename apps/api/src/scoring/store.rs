//! Feedback persistence.
//!
//! One report per (interview, user) pair, enforced by a unique key. A
//! regenerated report overwrites in place and keeps the original row id, so
//! links to a report never break.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::feedback::{CategoryScore, Feedback, FeedbackMetadata, QuestionRating};
use crate::models::progress::SessionComparison;

/// Interview fields the evaluation needs.
#[derive(Debug, Clone)]
pub struct InterviewContext {
    pub questions: Vec<String>,
    pub role: String,
    pub level: String,
}

/// Everything needed to write one feedback row.
#[derive(Debug, Clone)]
pub struct FeedbackDraft {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub user_id: Uuid,
    pub total_score: i64,
    pub overall_percentile: String,
    pub reliability_score: i64,
    pub category_scores: Vec<CategoryScore>,
    pub question_ratings: Vec<QuestionRating>,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub final_assessment: String,
    pub limitations: Vec<String>,
    pub next_steps: Vec<String>,
    pub session_comparison: Option<SessionComparison>,
    pub metadata: FeedbackMetadata,
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// `None` when the interview does not exist or belongs to someone else.
    async fn interview_context(
        &self,
        interview_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<InterviewContext>, AppError>;

    /// Idempotent upsert keyed on (interview_id, user_id). Returns the
    /// stored row's id, which on regeneration is the original one.
    async fn persist(&self, draft: &FeedbackDraft) -> Result<Uuid, AppError>;

    /// Marks the interview finalized. Keeps any duration the webhook
    /// already wrote, falling back to the caller's measurement.
    async fn mark_finalized(
        &self,
        interview_id: Uuid,
        duration_minutes: Option<i64>,
    ) -> Result<(), AppError>;

    async fn fetch(
        &self,
        interview_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Feedback>, AppError>;
}

pub struct PgFeedbackStore {
    pool: PgPool,
}

impl PgFeedbackStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ContextRow {
    questions: Vec<String>,
    role: String,
    level: String,
}

#[async_trait]
impl FeedbackStore for PgFeedbackStore {
    async fn interview_context(
        &self,
        interview_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<InterviewContext>, AppError> {
        let row: Option<ContextRow> = sqlx::query_as(
            "SELECT questions, role, level FROM interviews WHERE id = $1 AND user_id = $2",
        )
        .bind(interview_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| InterviewContext {
            questions: r.questions,
            role: r.role,
            level: r.level,
        }))
    }

    async fn persist(&self, draft: &FeedbackDraft) -> Result<Uuid, AppError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO feedback
                (id, interview_id, user_id, total_score, overall_percentile,
                 reliability_score, category_scores, question_ratings, strengths,
                 areas_for_improvement, final_assessment, limitations, next_steps,
                 session_comparison, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (interview_id, user_id) DO UPDATE SET
                total_score = EXCLUDED.total_score,
                overall_percentile = EXCLUDED.overall_percentile,
                reliability_score = EXCLUDED.reliability_score,
                category_scores = EXCLUDED.category_scores,
                question_ratings = EXCLUDED.question_ratings,
                strengths = EXCLUDED.strengths,
                areas_for_improvement = EXCLUDED.areas_for_improvement,
                final_assessment = EXCLUDED.final_assessment,
                limitations = EXCLUDED.limitations,
                next_steps = EXCLUDED.next_steps,
                session_comparison = EXCLUDED.session_comparison,
                metadata = EXCLUDED.metadata
            RETURNING id
            "#,
        )
        .bind(draft.id)
        .bind(draft.interview_id)
        .bind(draft.user_id)
        .bind(draft.total_score)
        .bind(&draft.overall_percentile)
        .bind(draft.reliability_score)
        .bind(Json(&draft.category_scores))
        .bind(Json(&draft.question_ratings))
        .bind(&draft.strengths)
        .bind(&draft.areas_for_improvement)
        .bind(&draft.final_assessment)
        .bind(&draft.limitations)
        .bind(&draft.next_steps)
        .bind(draft.session_comparison.as_ref().map(Json))
        .bind(Json(&draft.metadata))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn mark_finalized(
        &self,
        interview_id: Uuid,
        duration_minutes: Option<i64>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE interviews
            SET finalized = TRUE,
                duration_minutes = COALESCE(interviews.duration_minutes, $2),
                end_time = COALESCE(interviews.end_time, now())
            WHERE id = $1
            "#,
        )
        .bind(interview_id)
        .bind(duration_minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(
        &self,
        interview_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Feedback>, AppError> {
        let feedback: Option<Feedback> = sqlx::query_as(
            r#"
            SELECT id, interview_id, user_id, total_score, overall_percentile,
                   reliability_score, category_scores, question_ratings, strengths,
                   areas_for_improvement, final_assessment, limitations, next_steps,
                   session_comparison, metadata, created_at
            FROM feedback
            WHERE interview_id = $1 AND user_id = $2
            "#,
        )
        .bind(interview_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(feedback)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// In-memory store (tests)
// ─────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[derive(Default)]
pub struct MemoryFeedbackStore {
    /// Returned for every lookup; `None` simulates a missing interview.
    pub context: Option<InterviewContext>,
    pub inner: tokio::sync::Mutex<MemoryFeedback>,
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryFeedback {
    pub persisted: Vec<FeedbackDraft>,
    pub finalized: Vec<(Uuid, Option<i64>)>,
}

#[cfg(test)]
impl MemoryFeedbackStore {
    pub fn with_context(context: InterviewContext) -> Self {
        Self {
            context: Some(context),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[async_trait]
impl FeedbackStore for MemoryFeedbackStore {
    async fn interview_context(
        &self,
        _interview_id: Uuid,
        _user_id: Uuid,
    ) -> Result<Option<InterviewContext>, AppError> {
        Ok(self.context.clone())
    }

    async fn persist(&self, draft: &FeedbackDraft) -> Result<Uuid, AppError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .persisted
            .iter_mut()
            .find(|f| f.interview_id == draft.interview_id && f.user_id == draft.user_id)
        {
            let original_id = existing.id;
            *existing = FeedbackDraft {
                id: original_id,
                ..draft.clone()
            };
            return Ok(original_id);
        }
        inner.persisted.push(draft.clone());
        Ok(draft.id)
    }

    async fn mark_finalized(
        &self,
        interview_id: Uuid,
        duration_minutes: Option<i64>,
    ) -> Result<(), AppError> {
        self.inner
            .lock()
            .await
            .finalized
            .push((interview_id, duration_minutes));
        Ok(())
    }

    async fn fetch(
        &self,
        _interview_id: Uuid,
        _user_id: Uuid,
    ) -> Result<Option<Feedback>, AppError> {
        // Reads go straight to Postgres in production; tests assert on
        // `persisted` instead.
        Ok(None)
    }
}
