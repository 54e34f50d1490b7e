//! History reads and rollup writes for progress tracking.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::feedback::CategoryScore;
use crate::models::progress::{CategoryTrend, ProgressTrend, UserProgress};

/// One historical feedback report, reduced to what the trend math reads.
#[derive(Debug, Clone)]
pub struct FeedbackPoint {
    pub total_score: i64,
    pub category_scores: Vec<(String, i64)>,
}

/// Computed per-user rollup, merge-upserted after every report.
#[derive(Debug, Clone)]
pub struct ProgressRollup {
    pub user_id: Uuid,
    pub total_sessions: i64,
    pub average_score: f64,
    pub best_score: i64,
    pub recent_trend: ProgressTrend,
    pub category_trends: Vec<CategoryTrend>,
    pub recommendations: Vec<String>,
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Feedback history, most recent first.
    async fn recent_scores(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<FeedbackPoint>, AppError>;

    async fn feedback_count(&self, user_id: Uuid) -> Result<i64, AppError>;

    async fn upsert_rollup(&self, rollup: &ProgressRollup) -> Result<(), AppError>;

    async fn fetch_rollup(&self, user_id: Uuid) -> Result<Option<UserProgress>, AppError>;
}

pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FeedbackScoreRow {
    total_score: i64,
    category_scores: Json<Vec<CategoryScore>>,
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn recent_scores(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<FeedbackPoint>, AppError> {
        let rows: Vec<FeedbackScoreRow> = sqlx::query_as(
            r#"
            SELECT total_score, category_scores
            FROM feedback
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FeedbackPoint {
                total_score: row.total_score,
                category_scores: row
                    .category_scores
                    .0
                    .into_iter()
                    .map(|c| (c.name, c.score))
                    .collect(),
            })
            .collect())
    }

    async fn feedback_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn upsert_rollup(&self, rollup: &ProgressRollup) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_progress
                (user_id, total_sessions, average_score, best_score,
                 recent_trend, category_trends, recommendations, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            ON CONFLICT (user_id) DO UPDATE SET
                total_sessions = EXCLUDED.total_sessions,
                average_score = EXCLUDED.average_score,
                best_score = EXCLUDED.best_score,
                recent_trend = EXCLUDED.recent_trend,
                category_trends = EXCLUDED.category_trends,
                recommendations = EXCLUDED.recommendations,
                last_updated = now()
            "#,
        )
        .bind(rollup.user_id)
        .bind(rollup.total_sessions)
        .bind(rollup.average_score)
        .bind(rollup.best_score)
        .bind(Json(&rollup.recent_trend))
        .bind(Json(&rollup.category_trends))
        .bind(&rollup.recommendations)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_rollup(&self, user_id: Uuid) -> Result<Option<UserProgress>, AppError> {
        let row: Option<UserProgress> = sqlx::query_as(
            r#"
            SELECT user_id, total_sessions, average_score, best_score,
                   recent_trend, category_trends, recommendations, last_updated
            FROM user_progress
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// In-memory store (tests)
// ─────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[derive(Default)]
pub struct MemoryProgressStore {
    pub inner: tokio::sync::Mutex<MemoryProgress>,
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryProgress {
    /// Oldest first; `recent_scores` reverses.
    pub history: std::collections::HashMap<Uuid, Vec<FeedbackPoint>>,
    pub rollups: std::collections::HashMap<Uuid, ProgressRollup>,
}

#[cfg(test)]
impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_score(&self, user_id: Uuid, total: i64, categories: &[(&str, i64)]) {
        let point = FeedbackPoint {
            total_score: total,
            category_scores: categories
                .iter()
                .map(|(name, score)| (name.to_string(), *score))
                .collect(),
        };
        self.inner
            .lock()
            .await
            .history
            .entry(user_id)
            .or_default()
            .push(point);
    }
}

#[cfg(test)]
#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn recent_scores(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<FeedbackPoint>, AppError> {
        let inner = self.inner.lock().await;
        let mut points: Vec<FeedbackPoint> = inner
            .history
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        points.reverse();
        points.truncate(limit as usize);
        Ok(points)
    }

    async fn feedback_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.history.get(&user_id).map_or(0, |h| h.len() as i64))
    }

    async fn upsert_rollup(&self, rollup: &ProgressRollup) -> Result<(), AppError> {
        self.inner
            .lock()
            .await
            .rollups
            .insert(rollup.user_id, rollup.clone());
        Ok(())
    }

    async fn fetch_rollup(&self, user_id: Uuid) -> Result<Option<UserProgress>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.rollups.get(&user_id).map(|r| UserProgress {
            user_id: r.user_id,
            total_sessions: r.total_sessions,
            average_score: r.average_score,
            best_score: r.best_score,
            recent_trend: Json(r.recent_trend.clone()),
            category_trends: Json(r.category_trends.clone()),
            recommendations: r.recommendations.clone(),
            last_updated: chrono::Utc::now(),
        }))
    }
}
