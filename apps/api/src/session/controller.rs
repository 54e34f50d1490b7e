use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::{SessionStatus, WarningLevel};
use crate::quota::guard::QuotaGuard;
use crate::quota::ledger::PlanLedger;
use crate::session::errors::{classify_error, ErrorClass};
use crate::session::store::{NewVoiceError, NewVoiceSession, SessionStore};

pub const COST_PER_MINUTE: f64 = 0.12;

/// How long finished sessions stay visible to health checks before the
/// maintenance sweep may evict them.
pub const FINISHED_RETENTION: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no session minutes left for this period")]
    BudgetExhausted,

    #[error("session not found")]
    NotFound,

    #[error("session already finalized as '{}'", .0.as_str())]
    AlreadyFinalized(SessionStatus),

    #[error("invalid duration: {0} minutes")]
    InvalidDuration(i64),

    #[error(transparent)]
    App(#[from] AppError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub session_id: Uuid,
    pub max_duration_minutes: i64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionHealth {
    pub is_active: bool,
    pub remaining_minutes: f64,
    pub warning_level: WarningLevel,
}

struct LiveSession {
    user_id: Uuid,
    interview_id: Uuid,
    started_at: DateTime<Utc>,
    /// Monotonic start, used for all elapsed math (wall clock can jump).
    started: tokio::time::Instant,
    max_duration_minutes: i64,
    estimated_cost: f64,
    status: SessionStatus,
    actual_duration_minutes: Option<i64>,
    actual_cost: Option<f64>,
    timer: Option<JoinHandle<()>>,
    finished: Option<tokio::time::Instant>,
}

struct Finalized {
    user_id: Uuid,
    minutes: i64,
    cost: f64,
}

/// Lifecycle owner for voice sessions.
///
/// The registry is the authority while the process runs; rows are a mirror.
/// Every transition happens under the registry write lock with a fresh
/// status check, so the timer's `abort` is an optimization and never the
/// thing correctness depends on.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    sessions: RwLock<HashMap<Uuid, LiveSession>>,
    store: Arc<dyn SessionStore>,
    ledger: Arc<PlanLedger>,
    quota: Arc<QuotaGuard>,
    /// When true, call-end webhooks own the minute deduction and the client
    /// completion path only records usage.
    webhook_billing: bool,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        ledger: Arc<PlanLedger>,
        quota: Arc<QuotaGuard>,
        webhook_billing: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                sessions: RwLock::new(HashMap::new()),
                store,
                ledger,
                quota,
                webhook_billing,
            }),
        }
    }

    /// Starts a session: budget check, persisted row, registry entry, timer.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
        questions_count: i64,
    ) -> Result<SessionStarted, SessionError> {
        if questions_count < 1 {
            return Err(SessionError::App(AppError::Validation(
                "questions_count must be at least 1".into(),
            )));
        }

        let max_minutes = self
            .inner
            .quota
            .session_budget_minutes(user_id, questions_count)
            .await?;
        if max_minutes <= 0 {
            return Err(SessionError::BudgetExhausted);
        }

        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        let estimated_cost = max_minutes as f64 * COST_PER_MINUTE;

        self.inner
            .store
            .insert(&NewVoiceSession {
                id: session_id,
                user_id,
                interview_id,
                started_at,
                max_duration_minutes: max_minutes,
                questions_count,
                estimated_cost,
            })
            .await?;

        {
            let mut sessions = self.inner.sessions.write().await;
            sessions.insert(
                session_id,
                LiveSession {
                    user_id,
                    interview_id,
                    started_at,
                    started: tokio::time::Instant::now(),
                    max_duration_minutes: max_minutes,
                    estimated_cost,
                    status: SessionStatus::Active,
                    actual_duration_minutes: None,
                    actual_cost: None,
                    timer: None,
                    finished: None,
                },
            );
        }

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(max_minutes as u64 * 60)).await;
            controller.expire_session(session_id).await;
        });
        if let Some(live) = self.inner.sessions.write().await.get_mut(&session_id) {
            live.timer = Some(handle);
        }

        info!(
            %session_id,
            %user_id,
            %interview_id,
            max_minutes,
            "voice session started"
        );

        Ok(SessionStarted {
            session_id,
            max_duration_minutes: max_minutes,
            estimated_cost,
        })
    }

    /// Client-reported completion. The reported duration is clamped to the
    /// session's budget; what the client measures is a fallback, not an
    /// authority.
    pub async fn complete_session(
        &self,
        session_id: Uuid,
        actual_minutes: i64,
    ) -> Result<f64, SessionError> {
        if actual_minutes < 0 {
            return Err(SessionError::InvalidDuration(actual_minutes));
        }

        let (timer, finalized) = {
            let mut sessions = self.inner.sessions.write().await;
            let live = sessions
                .get_mut(&session_id)
                .ok_or(SessionError::NotFound)?;
            if live.status.is_terminal() {
                return Err(SessionError::AlreadyFinalized(live.status));
            }

            let minutes = actual_minutes.min(live.max_duration_minutes);
            if minutes < actual_minutes {
                debug!(
                    %session_id,
                    reported = actual_minutes,
                    clamped = minutes,
                    "client-reported duration exceeded the session budget"
                );
            }
            let cost = minutes as f64 * COST_PER_MINUTE;
            live.status = SessionStatus::Completed;
            live.actual_duration_minutes = Some(minutes);
            live.actual_cost = Some(cost);
            live.finished = Some(tokio::time::Instant::now());
            (
                live.timer.take(),
                Finalized {
                    user_id: live.user_id,
                    minutes,
                    cost,
                },
            )
        };

        if let Some(timer) = timer {
            timer.abort();
        }

        let applied = self
            .inner
            .store
            .finalize(
                session_id,
                SessionStatus::Completed,
                finalized.minutes,
                finalized.cost,
            )
            .await
            .map_err(|e| {
                error!(%session_id, user_id = %finalized.user_id, "failed to persist completion: {e}");
                e
            })?;
        if !applied {
            warn!(%session_id, "session row was already terminal while the registry was active");
        }

        self.inner
            .ledger
            .increment_usage(finalized.user_id, finalized.minutes)
            .await?;

        if !self.inner.webhook_billing {
            let outcome = self
                .inner
                .ledger
                .deduct_minutes(finalized.user_id, finalized.minutes)
                .await?;
            debug!(
                %session_id,
                deducted = finalized.minutes,
                remaining = outcome.remaining,
                "deducted session minutes on completion"
            );
        }

        info!(
            %session_id,
            user_id = %finalized.user_id,
            minutes = finalized.minutes,
            "voice session completed"
        );

        Ok(finalized.cost)
    }

    /// Timer body. A late fire against a finished session is a no-op.
    async fn expire_session(&self, session_id: Uuid) {
        let finalized = {
            let mut sessions = self.inner.sessions.write().await;
            let Some(live) = sessions.get_mut(&session_id) else {
                return;
            };
            if live.status.is_terminal() {
                return;
            }

            let minutes = ceil_minutes(live.started.elapsed());
            let cost = minutes as f64 * COST_PER_MINUTE;
            live.status = SessionStatus::Timeout;
            live.actual_duration_minutes = Some(minutes);
            live.actual_cost = Some(cost);
            live.finished = Some(tokio::time::Instant::now());
            live.timer = None;
            Finalized {
                user_id: live.user_id,
                minutes,
                cost,
            }
        };

        warn!(
            %session_id,
            user_id = %finalized.user_id,
            minutes = finalized.minutes,
            "session hit its duration budget, timed out"
        );

        if let Err(e) = self
            .inner
            .store
            .finalize(
                session_id,
                SessionStatus::Timeout,
                finalized.minutes,
                finalized.cost,
            )
            .await
        {
            error!(%session_id, user_id = %finalized.user_id, "failed to persist timeout: {e}");
        }
        if let Err(e) = self
            .inner
            .ledger
            .increment_usage(finalized.user_id, finalized.minutes)
            .await
        {
            error!(%session_id, user_id = %finalized.user_id, "failed to record timeout usage: {e}");
        }
        if !self.inner.webhook_billing {
            if let Err(e) = self
                .inner
                .ledger
                .deduct_minutes(finalized.user_id, finalized.minutes)
                .await
            {
                error!(%session_id, user_id = %finalized.user_id, "failed to deduct timeout minutes: {e}");
            }
        }
    }

    /// Reconciliation from the call-end webhook: finalizes a still-active
    /// session with the server-verified duration. Already-finished sessions
    /// are left alone. The webhook handler owns the deduction; usage is
    /// recorded here exactly once, on whichever transition wins.
    pub async fn finalize_from_webhook(
        &self,
        interview_id: Uuid,
        minutes: i64,
    ) -> Result<(), AppError> {
        let found = {
            let mut sessions = self.inner.sessions.write().await;
            let entry = sessions
                .iter_mut()
                .find(|(_, s)| s.interview_id == interview_id && s.status == SessionStatus::Active);
            match entry {
                None => None,
                Some((id, live)) => {
                    let cost = minutes as f64 * COST_PER_MINUTE;
                    live.status = SessionStatus::Completed;
                    live.actual_duration_minutes = Some(minutes);
                    live.actual_cost = Some(cost);
                    live.finished = Some(tokio::time::Instant::now());
                    let timer = live.timer.take();
                    Some((*id, timer, live.user_id, cost))
                }
            }
        };

        let Some((session_id, timer, user_id, cost)) = found else {
            return Ok(());
        };
        if let Some(timer) = timer {
            timer.abort();
        }

        if let Err(e) = self
            .inner
            .store
            .finalize(session_id, SessionStatus::Completed, minutes, cost)
            .await
        {
            error!(%session_id, %user_id, "failed to persist webhook completion: {e}");
        }
        self.inner.ledger.increment_usage(user_id, minutes).await?;

        info!(%session_id, %user_id, minutes, "session finalized from call-end webhook");
        Ok(())
    }

    /// Budget health for the client's in-call countdown.
    pub async fn session_health(&self, session_id: Uuid) -> SessionHealth {
        let sessions = self.inner.sessions.read().await;
        match sessions.get(&session_id) {
            Some(live) if live.status == SessionStatus::Active => {
                let (remaining, warning_level) = health_from(
                    live.started.elapsed().as_secs_f64(),
                    live.max_duration_minutes,
                );
                SessionHealth {
                    is_active: true,
                    remaining_minutes: remaining,
                    warning_level,
                }
            }
            _ => SessionHealth {
                is_active: false,
                remaining_minutes: 0.0,
                warning_level: WarningLevel::None,
            },
        }
    }

    /// Classifies and records a transport error. Non-retryable errors end
    /// the session; transient ones leave it running so the client can
    /// reconnect. Recording failures are logged, never propagated.
    pub async fn log_error(
        &self,
        session_id: Uuid,
        error_text: &str,
        code: Option<&str>,
    ) -> ErrorClass {
        let class = classify_error(error_text, code);
        error!(
            %session_id,
            kind = class.kind.as_str(),
            should_retry = class.should_retry,
            "voice session error: {error_text}"
        );

        if !class.should_retry {
            let finalized = {
                let mut sessions = self.inner.sessions.write().await;
                match sessions.get_mut(&session_id) {
                    Some(live) if live.status == SessionStatus::Active => {
                        let minutes = ceil_minutes(live.started.elapsed());
                        let cost = minutes as f64 * COST_PER_MINUTE;
                        live.status = SessionStatus::Error;
                        live.actual_duration_minutes = Some(minutes);
                        live.actual_cost = Some(cost);
                        live.finished = Some(tokio::time::Instant::now());
                        if let Some(timer) = live.timer.take() {
                            timer.abort();
                        }
                        Some(Finalized {
                            user_id: live.user_id,
                            minutes,
                            cost,
                        })
                    }
                    _ => None,
                }
            };

            if let Some(finalized) = finalized {
                if let Err(e) = self
                    .inner
                    .store
                    .finalize(
                        session_id,
                        SessionStatus::Error,
                        finalized.minutes,
                        finalized.cost,
                    )
                    .await
                {
                    error!(%session_id, user_id = %finalized.user_id, "failed to persist error transition: {e}");
                }
                // Capacity was consumed, so usage counts; the balance is
                // not charged for a session that died on us.
                if let Err(e) = self
                    .inner
                    .ledger
                    .increment_usage(finalized.user_id, finalized.minutes)
                    .await
                {
                    error!(%session_id, user_id = %finalized.user_id, "failed to record error-session usage: {e}");
                }
            }
        }

        let record = NewVoiceError {
            session_id,
            error_type: class.kind.as_str(),
            message: error_text.to_string(),
            user_message: class.user_message.to_string(),
            should_retry: class.should_retry,
        };
        if let Err(e) = self.inner.store.insert_error(&record).await {
            error!(%session_id, "failed to record voice error: {e}");
        }

        class
    }

    /// Evicts finished sessions older than `max_age` from the registry.
    /// Persisted rows are untouched.
    pub async fn sweep_finished(&self, max_age: Duration) -> usize {
        let mut sessions = self.inner.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, live| match live.finished {
            Some(at) => at.elapsed() < max_age,
            None => true,
        });
        before - sessions.len()
    }

    #[cfg(test)]
    async fn interview_of(&self, session_id: Uuid) -> Option<Uuid> {
        self.inner
            .sessions
            .read()
            .await
            .get(&session_id)
            .map(|s| s.interview_id)
    }
}

/// Whole billable minutes in an elapsed duration, rounded up.
fn ceil_minutes(elapsed: Duration) -> i64 {
    ((elapsed.as_secs() + 59) / 60) as i64
}

/// Remaining minutes and warning band for an active session.
/// Critical within the last minute, warning within the last three.
fn health_from(elapsed_secs: f64, max_minutes: i64) -> (f64, WarningLevel) {
    let remaining = (max_minutes as f64 - elapsed_secs / 60.0).max(0.0);
    let level = if remaining <= 1.0 {
        WarningLevel::Critical
    } else if remaining <= 3.0 {
        WarningLevel::Warning
    } else {
        WarningLevel::None
    };
    (remaining, level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::catalog::PlanId;
    use crate::quota::entitlements::StaticEntitlements;
    use crate::quota::guard::FixedCounter;
    use crate::quota::ledger::MemoryLedgerStore;
    use crate::session::errors::VoiceErrorKind;
    use crate::session::store::MemorySessionStore;

    struct Harness {
        controller: SessionController,
        store: Arc<MemorySessionStore>,
        ledger: Arc<PlanLedger>,
        user: Uuid,
    }

    fn harness(webhook_billing: bool) -> Harness {
        let ledger_store = Arc::new(MemoryLedgerStore::new());
        let entitlements = Arc::new(StaticEntitlements(Some(PlanId::Pro)));
        let ledger = Arc::new(PlanLedger::new(ledger_store, entitlements.clone()));
        let quota = Arc::new(QuotaGuard::new(
            ledger.clone(),
            entitlements,
            Arc::new(FixedCounter(0)),
        ));
        let store = Arc::new(MemorySessionStore::new());
        let controller = SessionController::new(
            store.clone() as Arc<dyn SessionStore>,
            ledger.clone(),
            quota,
            webhook_billing,
        );
        Harness {
            controller,
            store,
            ledger,
            user: Uuid::new_v4(),
        }
    }

    async fn settle_tasks() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_ceil_minutes_rounds_up() {
        assert_eq!(ceil_minutes(Duration::from_secs(0)), 0);
        assert_eq!(ceil_minutes(Duration::from_secs(60)), 1);
        assert_eq!(ceil_minutes(Duration::from_secs(61)), 2);
        assert_eq!(ceil_minutes(Duration::from_secs(600)), 10);
    }

    #[test]
    fn test_health_bands_on_ten_minute_budget() {
        // 9.5 of 10 minutes elapsed: half a minute left.
        let (remaining, level) = health_from(570.0, 10);
        assert!((remaining - 0.5).abs() < 1e-9);
        assert_eq!(level, WarningLevel::Critical);

        // 7 elapsed: exactly 3 left, inside the warning band.
        let (remaining, level) = health_from(420.0, 10);
        assert!((remaining - 3.0).abs() < 1e-9);
        assert_eq!(level, WarningLevel::Warning);

        // 2 elapsed: plenty left.
        let (remaining, level) = health_from(120.0, 10);
        assert!((remaining - 8.0).abs() < 1e-9);
        assert_eq!(level, WarningLevel::None);
    }

    #[tokio::test]
    async fn test_create_session_uses_question_budget() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();
        // 4 questions estimate 8 minutes plus 2 grace.
        assert_eq!(started.max_duration_minutes, 10);
        assert!((started.estimated_cost - 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exhausted_period_budget_blocks_creation() {
        let h = harness(false);
        // Pro grants 300 minutes per period; burn them all.
        h.ledger.increment_usage(h.user, 300).await.unwrap();
        let result = h.controller.create_session(h.user, Uuid::new_v4(), 4).await;
        assert!(matches!(result, Err(SessionError::BudgetExhausted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_follows_elapsed_time() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();
        let id = started.session_id;

        tokio::time::sleep(Duration::from_secs(120)).await;
        let health = h.controller.session_health(id).await;
        assert!(health.is_active);
        assert_eq!(health.warning_level, WarningLevel::None);

        tokio::time::sleep(Duration::from_secs(300)).await; // 7 minutes in
        let health = h.controller.session_health(id).await;
        assert_eq!(health.warning_level, WarningLevel::Warning);

        tokio::time::sleep(Duration::from_secs(150)).await; // 9.5 minutes in
        let health = h.controller.session_health(id).await;
        assert_eq!(health.warning_level, WarningLevel::Critical);
        assert!(health.remaining_minutes > 0.0 && health.remaining_minutes <= 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_expires_session_and_bills_usage() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();
        let id = started.session_id;

        tokio::time::sleep(Duration::from_secs(700)).await;
        settle_tasks().await;

        let health = h.controller.session_health(id).await;
        assert!(!health.is_active);

        assert_eq!(h.store.finalize_count(id).await, 1);
        let finalized = h.store.inner.lock().await.finalized.clone();
        assert_eq!(finalized[0].1, SessionStatus::Timeout);
        assert_eq!(finalized[0].2, 10);

        assert_eq!(h.ledger.usage_this_period(h.user).await.unwrap(), 10);
        // Client-billing mode also deducts on timeout.
        assert_eq!(h.ledger.minutes(h.user).await.unwrap(), 290);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_cancels_timer_and_settles_once() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();
        let id = started.session_id;

        tokio::time::sleep(Duration::from_secs(300)).await;
        let cost = h.controller.complete_session(id, 5).await.unwrap();
        assert!((cost - 0.6).abs() < 1e-9);

        // Long past the original deadline; the aborted timer must not fire,
        // and even if it did the terminal status makes it a no-op.
        tokio::time::sleep(Duration::from_secs(1000)).await;
        settle_tasks().await;

        assert_eq!(h.store.finalize_count(id).await, 1);
        let finalized = h.store.inner.lock().await.finalized.clone();
        assert_eq!(finalized[0].1, SessionStatus::Completed);
        assert_eq!(h.ledger.usage_this_period(h.user).await.unwrap(), 5);
        assert_eq!(h.ledger.minutes(h.user).await.unwrap(), 295);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_after_timeout_is_rejected() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(700)).await;
        settle_tasks().await;

        let result = h.controller.complete_session(started.session_id, 5).await;
        assert!(matches!(
            result,
            Err(SessionError::AlreadyFinalized(SessionStatus::Timeout))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_completion_is_rejected() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();

        h.controller
            .complete_session(started.session_id, 3)
            .await
            .unwrap();
        let second = h.controller.complete_session(started.session_id, 3).await;
        assert!(matches!(
            second,
            Err(SessionError::AlreadyFinalized(SessionStatus::Completed))
        ));
        assert_eq!(h.store.finalize_count(started.session_id).await, 1);
    }

    #[tokio::test]
    async fn test_webhook_billing_skips_client_deduction() {
        let h = harness(true);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();

        h.controller
            .complete_session(started.session_id, 5)
            .await
            .unwrap();

        // Usage is recorded, but the balance is the webhook's to charge.
        assert_eq!(h.ledger.usage_this_period(h.user).await.unwrap(), 5);
        assert_eq!(h.ledger.minutes(h.user).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_reported_duration_is_clamped_to_budget() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();

        h.controller
            .complete_session(started.session_id, 9999)
            .await
            .unwrap();
        // Budget was 10 minutes; the inflated report cannot deduct more.
        assert_eq!(h.ledger.minutes(h.user).await.unwrap(), 290);
    }

    #[tokio::test]
    async fn test_webhook_finalize_settles_exactly_once() {
        let h = harness(true);
        let interview_id = Uuid::new_v4();
        let started = h
            .controller
            .create_session(h.user, interview_id, 4)
            .await
            .unwrap();

        h.controller
            .finalize_from_webhook(interview_id, 7)
            .await
            .unwrap();
        assert_eq!(h.ledger.usage_this_period(h.user).await.unwrap(), 7);

        // Duplicate delivery: nothing moves.
        h.controller
            .finalize_from_webhook(interview_id, 7)
            .await
            .unwrap();
        assert_eq!(h.ledger.usage_this_period(h.user).await.unwrap(), 7);
        assert_eq!(h.store.finalize_count(started.session_id).await, 1);

        // Late client completion sees the terminal state.
        let late = h.controller.complete_session(started.session_id, 7).await;
        assert!(matches!(late, Err(SessionError::AlreadyFinalized(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_ends_session_without_charging_balance() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();
        let id = started.session_id;

        tokio::time::sleep(Duration::from_secs(90)).await;
        let class = h
            .controller
            .log_error(id, "microphone permission denied", None)
            .await;
        assert_eq!(class.kind, VoiceErrorKind::Permission);
        assert!(!class.should_retry);

        let health = h.controller.session_health(id).await;
        assert!(!health.is_active);

        let inner = h.store.inner.lock().await;
        assert_eq!(inner.errors.len(), 1);
        assert_eq!(inner.finalized.len(), 1);
        assert_eq!(inner.finalized[0].1, SessionStatus::Error);
        drop(inner);

        // 90 seconds bills as 2 whole minutes of usage, balance untouched.
        assert_eq!(h.ledger.usage_this_period(h.user).await.unwrap(), 2);
        assert_eq!(h.ledger.minutes(h.user).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_transient_error_leaves_session_active() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();

        let class = h
            .controller
            .log_error(started.session_id, "network connection lost", None)
            .await;
        assert!(class.should_retry);

        let health = h.controller.session_health(started.session_id).await;
        assert!(health.is_active);
        assert_eq!(h.store.inner.lock().await.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_health_of_unknown_session_is_inactive() {
        let h = harness(false);
        let health = h.controller.session_health(Uuid::new_v4()).await;
        assert!(!health.is_active);
        assert_eq!(health.remaining_minutes, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_old_finished_sessions() {
        let h = harness(false);
        let started = h
            .controller
            .create_session(h.user, Uuid::new_v4(), 4)
            .await
            .unwrap();
        let id = started.session_id;
        h.controller.complete_session(id, 5).await.unwrap();

        // Fresh finish survives the sweep.
        assert_eq!(h.controller.sweep_finished(FINISHED_RETENTION).await, 0);
        assert!(h.controller.interview_of(id).await.is_some());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(h.controller.sweep_finished(FINISHED_RETENTION).await, 1);
        assert!(h.controller.interview_of(id).await.is_none());
    }
}
