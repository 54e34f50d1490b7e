pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::{interviews, maintenance, progress, quota, scoring, session, webhooks};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Quota & balance
        .route("/api/v1/quota/plan", get(quota::handlers::plan_info))
        .route("/api/v1/quota/minutes", get(quota::handlers::minute_balance))
        .route(
            "/api/v1/quota/interview-gate",
            get(quota::handlers::interview_gate),
        )
        .route(
            "/api/v1/quota/resources/:kind",
            get(quota::handlers::resource_quota),
        )
        // Interviews
        .route(
            "/api/v1/interviews/generate",
            post(interviews::handlers::generate_interview),
        )
        .route(
            "/api/v1/interviews/:id",
            get(interviews::handlers::get_interview),
        )
        // Voice sessions
        .route("/api/v1/sessions", post(session::handlers::start_session))
        .route(
            "/api/v1/sessions/:id/complete",
            post(session::handlers::complete_session),
        )
        .route(
            "/api/v1/sessions/:id/health",
            get(session::handlers::session_health),
        )
        .route(
            "/api/v1/sessions/:id/errors",
            post(session::handlers::log_session_error),
        )
        // Feedback & progress
        .route("/api/v1/feedback", post(scoring::handlers::create_feedback))
        .route(
            "/api/v1/feedback/:interview_id",
            get(scoring::handlers::get_feedback),
        )
        .route(
            "/api/v1/progress/:user_id",
            get(progress::handlers::user_progress),
        )
        // Maintenance
        .route("/api/v1/maintenance/sweep", post(maintenance::sweep))
        // Inbound webhooks
        .route("/webhooks/voice", post(webhooks::voice::voice_webhook))
        .route("/webhooks/billing", post(webhooks::billing::billing_webhook))
        .with_state(state)
}
