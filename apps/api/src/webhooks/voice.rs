//! Voice transport webhook: call lifecycle and live transcript events.
//!
//! `call-end` is the billing authority when a webhook secret is configured;
//! the duration comes from server-verifiable timestamps, never from what the
//! client measured. Deliveries are claimed in `webhook_events` before any
//! money moves, so a duplicate `call-end` deducts exactly once.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::transcript::{Role, Utterance};
use crate::state::AppState;
use crate::webhooks::{claim_event, verify_secret, WebhookAck};

#[derive(Debug, Deserialize)]
pub struct VoiceWebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub call: VoiceCall,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Speaker of a `transcript` event.
    #[serde(default)]
    pub role: Option<Role>,
    /// Utterance text of a `transcript` event.
    #[serde(default)]
    pub transcript: Option<String>,
    pub metadata: CallMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    pub interview_id: Uuid,
    pub user_id: Uuid,
}

/// POST /webhooks/voice
pub async fn voice_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<VoiceWebhookEvent>,
) -> Result<Json<WebhookAck>, AppError> {
    verify_secret(&headers, state.config.voice_webhook_secret.as_deref())?;

    let interview_id = event.call.metadata.interview_id;
    let user_id = event.call.metadata.user_id;

    match event.kind.as_str() {
        "call-start" => {
            let started_at = event.call.started_at.unwrap_or_else(Utc::now);
            // First start wins; a redelivered start must not shift the clock.
            sqlx::query("UPDATE interviews SET start_time = COALESCE(start_time, $2) WHERE id = $1")
                .bind(interview_id)
                .bind(started_at)
                .execute(&state.db)
                .await?;
            info!(%interview_id, %user_id, "call started");
            Ok(Json(WebhookAck::recorded()))
        }

        "call-end" => {
            let key = end_event_key(event.call.id.as_deref(), interview_id);
            if !claim_event(&state.db, &key).await? {
                info!(%interview_id, %key, "duplicate call-end delivery, already settled");
                return Ok(Json(WebhookAck::duplicate()));
            }

            let started = match event.call.started_at {
                Some(at) => Some(at),
                None => {
                    sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                        "SELECT start_time FROM interviews WHERE id = $1",
                    )
                    .bind(interview_id)
                    .fetch_optional(&state.db)
                    .await?
                    .flatten()
                }
            };
            if started.is_none() {
                warn!(%interview_id, "call-end without any start timestamp, billing zero minutes");
            }
            let ended = event.call.ended_at.unwrap_or_else(Utc::now);
            let minutes = billable_minutes(started, ended);

            sqlx::query("UPDATE interviews SET end_time = $2, duration_minutes = $3 WHERE id = $1")
                .bind(interview_id)
                .bind(ended)
                .bind(minutes)
                .execute(&state.db)
                .await?;

            if state.config.webhook_billing_enabled() {
                let outcome = state.ledger.deduct_minutes(user_id, minutes).await?;
                info!(
                    %interview_id,
                    %user_id,
                    minutes,
                    remaining = outcome.remaining,
                    "deducted call minutes"
                );
            }
            state
                .sessions
                .finalize_from_webhook(interview_id, minutes)
                .await?;

            info!(%interview_id, %user_id, minutes, "call ended");
            Ok(Json(WebhookAck::recorded()))
        }

        "transcript" => {
            let Some(content) = event.call.transcript.filter(|t| !t.trim().is_empty()) else {
                return Ok(Json(WebhookAck::ignored()));
            };
            let utterance = Utterance {
                role: event.call.role.unwrap_or(Role::System),
                content,
            };
            state.transcripts.append(interview_id, utterance).await;
            Ok(Json(WebhookAck::recorded()))
        }

        other => {
            debug!(%interview_id, kind = other, "ignoring unrecognized voice event");
            Ok(Json(WebhookAck::ignored()))
        }
    }
}

/// Stable idempotency key for a call-end delivery. Falls back to the
/// interview when the transport sent no call id.
fn end_event_key(call_id: Option<&str>, interview_id: Uuid) -> String {
    match call_id {
        Some(id) if !id.is_empty() => format!("call-end:{id}"),
        _ => format!("call-end:interview:{interview_id}"),
    }
}

/// Whole billable minutes between the timestamps, rounded up. A missing
/// start or a negative interval bills zero.
fn billable_minutes(started: Option<DateTime<Utc>>, ended: DateTime<Utc>) -> i64 {
    let Some(started) = started else {
        return 0;
    };
    let secs = (ended - started).num_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + 59) / 60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_event_deserializes_transport_casing() {
        let event: VoiceWebhookEvent = serde_json::from_value(serde_json::json!({
            "type": "call-end",
            "call": {
                "id": "call_abc123",
                "startedAt": "2025-05-01T10:00:00Z",
                "endedAt": "2025-05-01T10:07:30Z",
                "metadata": {
                    "interviewId": "7f8a1f34-9f9f-4a6f-8d21-0a8f4c21e901",
                    "userId": "3e2d7c1a-5b64-4f0e-9a77-bb31c4e2d812"
                }
            }
        }))
        .unwrap();

        assert_eq!(event.kind, "call-end");
        assert_eq!(event.call.id.as_deref(), Some("call_abc123"));
        assert_eq!(event.call.started_at, Some(at("2025-05-01T10:00:00Z")));
        assert!(event.call.role.is_none());
    }

    #[test]
    fn test_transcript_event_accepts_role_aliases() {
        let parse = |role: &str| -> Role {
            let event: VoiceWebhookEvent = serde_json::from_value(serde_json::json!({
                "type": "transcript",
                "call": {
                    "role": role,
                    "transcript": "some words",
                    "metadata": {
                        "interviewId": "7f8a1f34-9f9f-4a6f-8d21-0a8f4c21e901",
                        "userId": "3e2d7c1a-5b64-4f0e-9a77-bb31c4e2d812"
                    }
                }
            }))
            .unwrap();
            event.call.role.unwrap()
        };

        assert_eq!(parse("assistant"), Role::Interviewer);
        assert_eq!(parse("user"), Role::Candidate);
        assert_eq!(parse("candidate"), Role::Candidate);
        assert_eq!(parse("robot"), Role::System);
    }

    #[test]
    fn test_billable_minutes_rounds_up() {
        let start = at("2025-05-01T10:00:00Z");
        assert_eq!(billable_minutes(Some(start), at("2025-05-01T10:01:01Z")), 2);
        assert_eq!(billable_minutes(Some(start), at("2025-05-01T10:10:00Z")), 10);
    }

    #[test]
    fn test_billable_minutes_floors_bad_intervals_at_zero() {
        let start = at("2025-05-01T10:00:00Z");
        // Ended before it started: clock garbage bills nothing.
        assert_eq!(billable_minutes(Some(start), at("2025-05-01T09:00:00Z")), 0);
        assert_eq!(billable_minutes(None, at("2025-05-01T10:00:00Z")), 0);
    }

    #[test]
    fn test_end_event_key_prefers_call_id() {
        let interview = Uuid::new_v4();
        assert_eq!(end_event_key(Some("call_9"), interview), "call-end:call_9");
        assert_eq!(
            end_event_key(None, interview),
            format!("call-end:interview:{interview}")
        );
        assert_eq!(
            end_event_key(Some(""), interview),
            format!("call-end:interview:{interview}")
        );
    }
}
