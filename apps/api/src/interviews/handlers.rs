use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interviews::generator::{self, GenerateInterviewRequest, GenerationError};
use crate::models::interview::Interview;
use crate::quota::handlers::UserQuery;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct GenerateInterviewResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interview: Option<Interview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Quota denials become `{success: false}` answers; anything infrastructural
/// keeps propagating as an HTTP error.
fn denial(err: GenerationError) -> Result<String, AppError> {
    match err {
        GenerationError::App(e) => Err(e),
        other => Ok(other.to_string()),
    }
}

/// POST /api/v1/interviews/generate
pub async fn generate_interview(
    State(state): State<AppState>,
    Json(req): Json<GenerateInterviewRequest>,
) -> Result<Json<GenerateInterviewResponse>, AppError> {
    match generator::generate_interview(&state.db, &state.llm, &state.quota, req).await {
        Ok(interview) => Ok(Json(GenerateInterviewResponse {
            success: true,
            interview: Some(interview),
            error: None,
        })),
        Err(err) => Ok(Json(GenerateInterviewResponse {
            success: false,
            interview: None,
            error: Some(denial(err)?),
        })),
    }
}

/// GET /api/v1/interviews/:id
pub async fn get_interview(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Interview>, AppError> {
    let interview: Option<Interview> = sqlx::query_as(
        r#"
        SELECT id, user_id, questions, role, level, specialty_skills,
               interview_type, tone, difficulty, is_personalized, finalized,
               start_time, end_time, duration_minutes, created_at
        FROM interviews
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(interview_id)
    .bind(query.user_id)
    .fetch_optional(&state.db)
    .await?;

    interview
        .map(Json)
        .ok_or_else(|| AppError::NotFound("interview not found".to_string()))
}
