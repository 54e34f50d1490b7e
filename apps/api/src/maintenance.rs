//! On-demand integrity sweep.
//!
//! Corrupted rows are repaired here, off the hot path: persisted scores are
//! clamped into [0, 100] and interviews whose webhook events never landed get
//! their timestamps reconstructed from what did. The sweep also evicts
//! long-finished sessions from the in-memory registry.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use crate::errors::AppError;
use crate::session::controller::{SessionController, FINISHED_RETENTION};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SweepSummary {
    pub scores_clamped: u64,
    pub timestamps_backfilled: u64,
    pub sessions_evicted: usize,
}

pub async fn run_sweep(
    pool: &PgPool,
    sessions: &SessionController,
) -> Result<SweepSummary, AppError> {
    let total = sqlx::query(
        r#"
        UPDATE feedback
        SET total_score = LEAST(100, GREATEST(0, total_score))
        WHERE total_score < 0 OR total_score > 100
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    let reliability = sqlx::query(
        r#"
        UPDATE feedback
        SET reliability_score = LEAST(100, GREATEST(0, reliability_score))
        WHERE reliability_score < 0 OR reliability_score > 100
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    // An end without a start: the call clearly ran, anchor on creation.
    let starts = sqlx::query(
        r#"
        UPDATE interviews
        SET start_time = created_at
        WHERE start_time IS NULL AND end_time IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    // A start and a settled duration without an end: reconstruct the end.
    let ends = sqlx::query(
        r#"
        UPDATE interviews
        SET end_time = start_time + make_interval(mins => duration_minutes::int)
        WHERE end_time IS NULL
          AND start_time IS NOT NULL
          AND duration_minutes IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    let evicted = sessions.sweep_finished(FINISHED_RETENTION).await;

    let summary = SweepSummary {
        scores_clamped: total + reliability,
        timestamps_backfilled: starts + ends,
        sessions_evicted: evicted,
    };
    info!(
        scores_clamped = summary.scores_clamped,
        timestamps_backfilled = summary.timestamps_backfilled,
        sessions_evicted = summary.sessions_evicted,
        "integrity sweep finished"
    );
    Ok(summary)
}

/// POST /api/v1/maintenance/sweep
pub async fn sweep(State(state): State<AppState>) -> Result<Json<SweepSummary>, AppError> {
    let summary = run_sweep(&state.db, &state.sessions).await?;
    Ok(Json(summary))
}
