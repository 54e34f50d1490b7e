use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::feedback::Feedback;
use crate::models::transcript::Utterance;
use crate::quota::handlers::UserQuery;
use crate::scoring::pipeline::{FeedbackRequest, ScoringError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateFeedbackRequest {
    pub interview_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub feedback_id: Option<Uuid>,
    #[serde(default)]
    pub transcript: Vec<Utterance>,
    #[serde(default)]
    pub actual_duration_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateFeedbackResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_percentile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreateFeedbackResponse {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            feedback_id: None,
            total_score: None,
            overall_percentile: None,
            error: Some(error),
        }
    }
}

/// Expected pipeline failures become `{success: false}` answers; anything
/// infrastructural keeps propagating as an HTTP error.
fn failure(err: ScoringError) -> Result<String, AppError> {
    match err {
        ScoringError::App(e) => Err(e),
        other => Ok(other.to_string()),
    }
}

/// POST /api/v1/feedback
pub async fn create_feedback(
    State(state): State<AppState>,
    Json(req): Json<CreateFeedbackRequest>,
) -> Result<Json<CreateFeedbackResponse>, AppError> {
    match state
        .pipeline
        .create_feedback(FeedbackRequest {
            interview_id: req.interview_id,
            user_id: req.user_id,
            feedback_id: req.feedback_id,
            transcript: req.transcript,
            actual_duration_minutes: req.actual_duration_minutes,
        })
        .await
    {
        Ok(created) => Ok(Json(CreateFeedbackResponse {
            success: true,
            feedback_id: Some(created.feedback_id),
            total_score: Some(created.total_score),
            overall_percentile: Some(created.overall_percentile),
            error: None,
        })),
        Err(err) => Ok(Json(CreateFeedbackResponse::failed(failure(err)?))),
    }
}

/// GET /api/v1/feedback/:interview_id
pub async fn get_feedback(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Feedback>, AppError> {
    state
        .pipeline
        .fetch(interview_id, query.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no feedback for this interview".to_string()))
}
