mod config;
mod db;
mod errors;
mod interviews;
mod llm_client;
mod maintenance;
mod models;
mod progress;
mod quota;
mod routes;
mod scoring;
mod session;
mod state;
mod webhooks;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::progress::store::PgProgressStore;
use crate::progress::tracker::ProgressTracker;
use crate::quota::entitlements::{
    DirectoryEntitlements, EntitlementSource, StoredPlanEntitlements,
};
use crate::quota::guard::QuotaGuard;
use crate::quota::ledger::PlanLedger;
use crate::quota::store::{PgLedgerStore, PgResourceCounter};
use crate::routes::build_router;
use crate::scoring::evaluator::LlmEvaluator;
use crate::scoring::pipeline::ScoringPipeline;
use crate::scoring::store::PgFeedbackStore;
use crate::session::controller::SessionController;
use crate::session::store::PgSessionStore;
use crate::session::transcript::TranscriptCollector;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (panics on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parley API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone()));
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Plan membership comes from the external directory when configured,
    // otherwise from the stored plan column the billing webhook keeps current.
    let entitlements: Arc<dyn EntitlementSource> = match &config.entitlements_url {
        Some(url) => {
            info!("Entitlement source: directory at {url}");
            Arc::new(DirectoryEntitlements::new(
                url.clone(),
                config.entitlements_api_key.clone(),
            ))
        }
        None => {
            info!("Entitlement source: stored plan column");
            Arc::new(StoredPlanEntitlements::new(db.clone()))
        }
    };

    let ledger = Arc::new(PlanLedger::new(
        Arc::new(PgLedgerStore::new(db.clone())),
        entitlements.clone(),
    ));
    let quota = Arc::new(QuotaGuard::new(
        ledger.clone(),
        entitlements,
        Arc::new(PgResourceCounter::new(db.clone())),
    ));

    let webhook_billing = config.webhook_billing_enabled();
    if webhook_billing {
        info!("Billing authority: call-end webhook");
    } else {
        info!("Billing authority: client completion path (no voice webhook secret)");
    }
    let sessions = SessionController::new(
        Arc::new(PgSessionStore::new(db.clone())),
        ledger.clone(),
        quota.clone(),
        webhook_billing,
    );

    let transcripts = Arc::new(TranscriptCollector::new());
    let progress = ProgressTracker::new(Arc::new(PgProgressStore::new(db.clone())));
    let pipeline = ScoringPipeline::new(
        Arc::new(LlmEvaluator::new(llm.clone())),
        Arc::new(PgFeedbackStore::new(db.clone())),
        progress.clone(),
        transcripts.clone(),
    );

    // Build app state
    let state = AppState {
        db,
        config: config.clone(),
        llm,
        ledger,
        quota,
        sessions,
        transcripts,
        pipeline,
        progress,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
