//! Inbound webhooks from the voice transport and the billing provider.
//!
//! Senders retry on anything but a 2xx, so handlers are idempotent: every
//! event that moves money or finalizes state claims a row in
//! `webhook_events` first, and a duplicate delivery short-circuits into an
//! acknowledged no-op. Secrets are shared-key headers, checked only when the
//! corresponding secret is configured.

use axum::http::HeaderMap;
use serde::Serialize;
use sqlx::PgPool;

use crate::errors::AppError;

pub mod billing;
pub mod voice;

pub const SECRET_HEADER: &str = "x-webhook-secret";

/// Uniform acknowledgement body. `outcome` says what the delivery did:
/// "recorded", "duplicate", or "ignored".
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub outcome: &'static str,
}

impl WebhookAck {
    fn recorded() -> Self {
        Self {
            success: true,
            outcome: "recorded",
        }
    }

    fn duplicate() -> Self {
        Self {
            success: true,
            outcome: "duplicate",
        }
    }

    fn ignored() -> Self {
        Self {
            success: true,
            outcome: "ignored",
        }
    }
}

/// Shared-secret check. A configured secret must be echoed back in the
/// `x-webhook-secret` header; with no secret configured the endpoint is open
/// (local development).
pub fn verify_secret(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let supplied = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if supplied == expected {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

/// Claims an event key. True on first delivery; false when some earlier
/// delivery already claimed it. The insert is the idempotency mechanism, so
/// callers must claim BEFORE applying side effects.
pub async fn claim_event(pool: &PgPool, event_key: &str) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO webhook_events (event_key)
        VALUES ($1)
        ON CONFLICT (event_key) DO NOTHING
        "#,
    )
    .bind(event_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
