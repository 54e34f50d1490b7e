//! Billing provider webhook: plan membership changes and minute purchases.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::quota::catalog::PlanId;
use crate::state::AppState;
use crate::webhooks::{claim_event, verify_secret, WebhookAck};

#[derive(Debug, Deserialize)]
pub struct BillingEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: Uuid,
    /// `membership.updated` payload.
    #[serde(default)]
    pub plan_type: Option<String>,
    /// `minutes.purchased` payload.
    #[serde(default)]
    pub minutes: Option<i64>,
    #[serde(default)]
    pub event_id: Option<String>,
}

/// POST /webhooks/billing
///
/// Membership changes overwrite the balance with the new plan's grant; a
/// plan change is a reset, never a top-up. Purchases are additive and
/// guarded against redelivery when the provider sends an event id.
pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<BillingEvent>,
) -> Result<Json<WebhookAck>, AppError> {
    verify_secret(&headers, state.config.billing_webhook_secret.as_deref())?;

    match event.kind.as_str() {
        "membership.updated" => {
            let raw = event.plan_type.unwrap_or_default();
            let Some(plan) = PlanId::parse(&raw) else {
                warn!(user_id = %event.user_id, plan = %raw, "membership event with unrecognized plan, skipped");
                return Ok(Json(WebhookAck::ignored()));
            };
            let granted = state.ledger.set_plan_minutes(event.user_id, plan).await?;
            info!(
                user_id = %event.user_id,
                plan = plan.as_str(),
                granted,
                "membership updated"
            );
            Ok(Json(WebhookAck::recorded()))
        }

        "minutes.purchased" => {
            let Some(minutes) = event.minutes else {
                return Err(AppError::Validation(
                    "minutes.purchased event without a minutes field".into(),
                ));
            };
            if let Some(event_id) = event.event_id.as_deref() {
                let key = format!("minutes-purchased:{event_id}");
                if !claim_event(&state.db, &key).await? {
                    info!(user_id = %event.user_id, %key, "duplicate purchase delivery, already credited");
                    return Ok(Json(WebhookAck::duplicate()));
                }
            }
            let balance = state.ledger.add_minutes(event.user_id, minutes).await?;
            info!(user_id = %event.user_id, minutes, balance, "minutes purchased");
            Ok(Json(WebhookAck::recorded()))
        }

        other => {
            debug!(user_id = %event.user_id, kind = other, "ignoring unrecognized billing event");
            Ok(Json(WebhookAck::ignored()))
        }
    }
}
