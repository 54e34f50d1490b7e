use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::quota::guard::{InterviewGate, PlanInfo, ResourceKind, ResourceQuota};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GateQuery {
    pub user_id: Uuid,
    pub question_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MinutesResponse {
    pub minutes: i64,
}

/// GET /api/v1/quota/plan
pub async fn plan_info(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<PlanInfo>, AppError> {
    Ok(Json(state.quota.plan_info(query.user_id).await?))
}

/// GET /api/v1/quota/minutes
/// Reading the balance performs the first-use grant for new accounts.
pub async fn minute_balance(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<MinutesResponse>, AppError> {
    let minutes = state.ledger.minutes(query.user_id).await?;
    Ok(Json(MinutesResponse { minutes }))
}

/// GET /api/v1/quota/interview-gate
pub async fn interview_gate(
    State(state): State<AppState>,
    Query(query): Query<GateQuery>,
) -> Result<Json<InterviewGate>, AppError> {
    let gate = state
        .quota
        .can_start_interview(query.user_id, query.question_count)
        .await?;
    Ok(Json(gate))
}

/// GET /api/v1/quota/resources/:kind
pub async fn resource_quota(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ResourceQuota>, AppError> {
    let kind = ResourceKind::parse(&kind)
        .ok_or_else(|| AppError::Validation(format!("unknown resource kind '{kind}'")))?;
    let quota = state.quota.quota_availability(query.user_id, kind).await?;
    Ok(Json(quota))
}
