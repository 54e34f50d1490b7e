use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::progress::UserProgress;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub progress: Option<UserProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// GET /api/v1/progress/:user_id
/// Too little history is a domain outcome, not an error: 200 with a reason.
pub async fn user_progress(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, AppError> {
    let progress = state.progress.progress_summary(user_id).await?;
    let reason = progress
        .is_none()
        .then_some("at least two completed sessions are required");
    Ok(Json(ProgressResponse { progress, reason }))
}
