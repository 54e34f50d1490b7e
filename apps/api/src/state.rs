use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::progress::tracker::ProgressTracker;
use crate::quota::guard::QuotaGuard;
use crate::quota::ledger::PlanLedger;
use crate::scoring::pipeline::ScoringPipeline;
use crate::session::controller::SessionController;
use crate::session::transcript::TranscriptCollector;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub llm: Arc<LlmClient>,
    /// Minute balance authority; every balance mutation goes through it.
    pub ledger: Arc<PlanLedger>,
    pub quota: Arc<QuotaGuard>,
    pub sessions: SessionController,
    /// Webhook-fed transcript buffers, drained by the feedback pipeline.
    pub transcripts: Arc<TranscriptCollector>,
    pub pipeline: ScoringPipeline,
    pub progress: ProgressTracker,
}
