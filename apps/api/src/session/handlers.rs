use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::controller::{SessionError, SessionHealth};
use crate::session::errors::VoiceErrorKind;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: Uuid,
    pub interview_id: Uuid,
    pub questions_count: i64,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StartSessionResponse {
    fn denied(error: String) -> Self {
        Self {
            success: false,
            session_id: None,
            max_duration_minutes: None,
            estimated_cost: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CompleteSessionRequest {
    pub actual_duration_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct CompleteSessionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogErrorRequest {
    pub error: String,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogErrorResponse {
    pub success: bool,
    pub error_type: VoiceErrorKind,
    pub user_message: &'static str,
    pub should_retry: bool,
}

/// Expected session failures become `{success: false}` answers; anything
/// infrastructural keeps propagating as an HTTP error.
fn denial(err: SessionError) -> Result<String, AppError> {
    match err {
        SessionError::App(e) => Err(e),
        other => Ok(other.to_string()),
    }
}

/// POST /api/v1/sessions
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, AppError> {
    let owned: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM interviews WHERE id = $1 AND user_id = $2)",
    )
    .bind(req.interview_id)
    .bind(req.user_id)
    .fetch_one(&state.db)
    .await?;
    if !owned {
        return Ok(Json(StartSessionResponse::denied(
            "interview not found for this user".to_string(),
        )));
    }

    match state
        .sessions
        .create_session(req.user_id, req.interview_id, req.questions_count)
        .await
    {
        Ok(started) => Ok(Json(StartSessionResponse {
            success: true,
            session_id: Some(started.session_id),
            max_duration_minutes: Some(started.max_duration_minutes),
            estimated_cost: Some(started.estimated_cost),
            error: None,
        })),
        Err(err) => Ok(Json(StartSessionResponse::denied(denial(err)?))),
    }
}

/// POST /api/v1/sessions/:id/complete
pub async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<CompleteSessionRequest>,
) -> Result<Json<CompleteSessionResponse>, AppError> {
    match state
        .sessions
        .complete_session(session_id, req.actual_duration_minutes)
        .await
    {
        Ok(cost) => Ok(Json(CompleteSessionResponse {
            success: true,
            cost: Some(cost),
            error: None,
        })),
        Err(err) => Ok(Json(CompleteSessionResponse {
            success: false,
            cost: None,
            error: Some(denial(err)?),
        })),
    }
}

/// GET /api/v1/sessions/:id/health
pub async fn session_health(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Json<SessionHealth> {
    Json(state.sessions.session_health(session_id).await)
}

/// POST /api/v1/sessions/:id/errors
pub async fn log_session_error(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<LogErrorRequest>,
) -> Json<LogErrorResponse> {
    let class = state
        .sessions
        .log_error(session_id, &req.error, req.code.as_deref())
        .await;
    Json(LogErrorResponse {
        success: true,
        error_type: class.kind,
        user_message: class.user_message,
        should_retry: class.should_retry,
    })
}
