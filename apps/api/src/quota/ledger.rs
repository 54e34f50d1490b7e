//! The minutes ledger.
//!
//! Balances live in the `users` row as a single counter. Every mutation goes
//! through compare-and-swap with bounded retries; nothing in this module ever
//! does a naive read-then-write. Deductions floor at zero by contract: an
//! overdraft is not an error, but it is flagged in telemetry because it means
//! a session ran past what the plan covered.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::quota::catalog::{entitlement, PlanId};
use crate::quota::entitlements::{resolve_plan, EntitlementSource};

const MAX_CAS_ATTEMPTS: u32 = 5;

/// Balance fields of the account row. `total_minutes` is None until the
/// first-use grant has run.
#[derive(Debug, Clone, Default)]
pub struct BalanceSnapshot {
    pub total_minutes: Option<i64>,
    pub plan_type: Option<String>,
}

/// Storage surface under the ledger. The production implementation is
/// Postgres (`PgLedgerStore`); tests use an in-memory store so the
/// concurrency discipline is exercised without a database.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Balance fields for the account; defaults when the row does not exist.
    async fn balance(&self, user_id: Uuid) -> Result<BalanceSnapshot, AppError>;

    /// Writes the initial balance if and only if none has been granted.
    /// Returns true when this call performed the grant. Concurrent callers
    /// must observe at most one true.
    async fn grant_if_unset(
        &self,
        user_id: Uuid,
        minutes: i64,
        plan: Option<PlanId>,
    ) -> Result<bool, AppError>;

    /// One compare-and-swap on the balance. True when the write applied,
    /// false when the stored value no longer matched `expected`.
    async fn swap_balance(&self, user_id: Uuid, expected: i64, new: i64) -> Result<bool, AppError>;

    /// Unconditional overwrite, used on plan (re)assignment.
    async fn set_balance(&self, user_id: Uuid, minutes: i64, plan: PlanId) -> Result<(), AppError>;

    /// Adds to the consumed-minutes counter for a billing period.
    async fn add_usage(&self, user_id: Uuid, period: &str, minutes: i64) -> Result<(), AppError>;

    async fn usage(&self, user_id: Uuid, period: &str) -> Result<i64, AppError>;
}

/// Billing periods are calendar months, keyed "YYYY-MM".
pub fn period_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct DeductOutcome {
    pub previous: i64,
    pub remaining: i64,
    /// True when the requested deduction exceeded the balance and the
    /// result was clamped to zero.
    pub floored: bool,
}

pub struct PlanLedger {
    store: Arc<dyn LedgerStore>,
    entitlements: Arc<dyn EntitlementSource>,
}

impl PlanLedger {
    pub fn new(store: Arc<dyn LedgerStore>, entitlements: Arc<dyn EntitlementSource>) -> Self {
        Self {
            store,
            entitlements,
        }
    }

    /// Current balance. The first read for an account resolves the user's
    /// plan and grants its minutes; unsubscribed users initialize to zero.
    /// The grant is a conditional write, so concurrent first reads cannot
    /// grant twice.
    pub async fn minutes(&self, user_id: Uuid) -> Result<i64, AppError> {
        let snapshot = self.store.balance(user_id).await?;
        if let Some(balance) = snapshot.total_minutes {
            return Ok(balance);
        }

        let plan = resolve_plan(self.entitlements.as_ref(), user_id).await?;
        let granted = plan.map(|p| entitlement(p).minutes_granted).unwrap_or(0);

        if self.store.grant_if_unset(user_id, granted, plan).await? {
            info!(%user_id, ?plan, granted, "granted initial minute balance");
            return Ok(granted);
        }

        // Lost the grant race; read what the winner wrote.
        Ok(self
            .store
            .balance(user_id)
            .await?
            .total_minutes
            .unwrap_or(granted))
    }

    /// Adds purchased minutes. Returns the new balance.
    pub async fn add_minutes(&self, user_id: Uuid, minutes: i64) -> Result<i64, AppError> {
        if minutes < 0 {
            return Err(AppError::Validation(
                "minutes to add must be non-negative".into(),
            ));
        }
        if minutes == 0 {
            return self.minutes(user_id).await;
        }

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let current = self.minutes(user_id).await?;
            let new_balance = current + minutes;
            if self.store.swap_balance(user_id, current, new_balance).await? {
                info!(%user_id, added = minutes, balance = new_balance, "added minutes");
                return Ok(new_balance);
            }
            debug!(%user_id, attempt, "balance write contended, retrying");
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "balance write for {user_id} lost {MAX_CAS_ATTEMPTS} races"
        )))
    }

    /// Deducts consumed minutes, flooring at zero. Flooring is not an error;
    /// it is logged so overdrafts show up in telemetry.
    pub async fn deduct_minutes(
        &self,
        user_id: Uuid,
        minutes: i64,
    ) -> Result<DeductOutcome, AppError> {
        if minutes < 0 {
            return Err(AppError::Validation(
                "minutes to deduct must be non-negative".into(),
            ));
        }

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let current = self.minutes(user_id).await?;
            let remaining = (current - minutes).max(0);
            if self.store.swap_balance(user_id, current, remaining).await? {
                if minutes > current {
                    warn!(
                        %user_id,
                        balance = current,
                        requested = minutes,
                        shortfall = minutes - current,
                        "deduction exceeded balance, floored at zero"
                    );
                }
                return Ok(DeductOutcome {
                    previous: current,
                    remaining,
                    floored: minutes > current,
                });
            }
            debug!(%user_id, attempt, "balance write contended, retrying");
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "balance write for {user_id} lost {MAX_CAS_ATTEMPTS} races"
        )))
    }

    /// Overwrites the balance with the plan's grant. Billing webhook path;
    /// intentionally not additive.
    pub async fn set_plan_minutes(&self, user_id: Uuid, plan: PlanId) -> Result<i64, AppError> {
        let granted = entitlement(plan).minutes_granted;
        self.store.set_balance(user_id, granted, plan).await?;
        info!(%user_id, plan = plan.as_str(), granted, "plan assigned, balance overwritten");
        Ok(granted)
    }

    /// Usage accounting, separate from the user-facing balance. Sessions
    /// report their consumed minutes here on every terminal transition.
    pub async fn increment_usage(&self, user_id: Uuid, minutes: i64) -> Result<(), AppError> {
        if minutes <= 0 {
            return Ok(());
        }
        let period = period_key(Utc::now());
        self.store.add_usage(user_id, &period, minutes).await?;
        debug!(%user_id, period, minutes, "recorded session usage");
        Ok(())
    }

    pub async fn usage_this_period(&self, user_id: Uuid) -> Result<i64, AppError> {
        self.store.usage(user_id, &period_key(Utc::now())).await
    }
}

// ─────────────────────────────────────────────────────────────────────────
// In-memory store (tests)
// ─────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub struct MemoryLedgerStore {
    inner: tokio::sync::Mutex<MemoryLedger>,
}

#[cfg(test)]
#[derive(Default)]
struct MemoryLedger {
    balances: std::collections::HashMap<Uuid, BalanceSnapshot>,
    usage: std::collections::HashMap<(Uuid, String), i64>,
    grants_applied: u32,
}

#[cfg(test)]
impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            inner: tokio::sync::Mutex::new(MemoryLedger::default()),
        }
    }

    pub async fn grants_applied(&self) -> u32 {
        self.inner.lock().await.grants_applied
    }
}

#[cfg(test)]
#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn balance(&self, user_id: Uuid) -> Result<BalanceSnapshot, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.balances.get(&user_id).cloned().unwrap_or_default())
    }

    async fn grant_if_unset(
        &self,
        user_id: Uuid,
        minutes: i64,
        plan: Option<PlanId>,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.balances.entry(user_id).or_default();
        if entry.total_minutes.is_some() {
            return Ok(false);
        }
        entry.total_minutes = Some(minutes);
        entry.plan_type = plan.map(|p| p.as_str().to_string());
        inner.grants_applied += 1;
        Ok(true)
    }

    async fn swap_balance(&self, user_id: Uuid, expected: i64, new: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.balances.entry(user_id).or_default();
        if entry.total_minutes != Some(expected) {
            return Ok(false);
        }
        entry.total_minutes = Some(new);
        Ok(true)
    }

    async fn set_balance(&self, user_id: Uuid, minutes: i64, plan: PlanId) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.balances.entry(user_id).or_default();
        entry.total_minutes = Some(minutes);
        entry.plan_type = Some(plan.as_str().to_string());
        Ok(())
    }

    async fn add_usage(&self, user_id: Uuid, period: &str, minutes: i64) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        *inner.usage.entry((user_id, period.to_string())).or_insert(0) += minutes;
        Ok(())
    }

    async fn usage(&self, user_id: Uuid, period: &str) -> Result<i64, AppError> {
        let inner = self.inner.lock().await;
        Ok(*inner.usage.get(&(user_id, period.to_string())).unwrap_or(&0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::entitlements::StaticEntitlements;

    fn ledger_with_plan(plan: Option<PlanId>) -> (PlanLedger, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        let ledger = PlanLedger::new(store.clone(), Arc::new(StaticEntitlements(plan)));
        (ledger, store)
    }

    #[tokio::test]
    async fn test_first_read_grants_plan_minutes() {
        let (ledger, store) = ledger_with_plan(Some(PlanId::Basic));
        let user = Uuid::new_v4();

        assert_eq!(ledger.minutes(user).await.unwrap(), 60);
        // Second read is a plain read, not another grant.
        assert_eq!(ledger.minutes(user).await.unwrap(), 60);
        assert_eq!(store.grants_applied().await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribed_user_initializes_to_zero() {
        let (ledger, _) = ledger_with_plan(None);
        assert_eq!(ledger.minutes(Uuid::new_v4()).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_reads_grant_once() {
        let (ledger, store) = ledger_with_plan(Some(PlanId::Pro));
        let ledger = Arc::new(ledger);
        let user = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.minutes(user).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 300);
        }
        assert_eq!(store.grants_applied().await, 1);
    }

    #[tokio::test]
    async fn test_deduct_floors_at_zero() {
        let (ledger, _) = ledger_with_plan(Some(PlanId::Basic));
        let user = Uuid::new_v4();

        let outcome = ledger.deduct_minutes(user, 100).await.unwrap();
        assert_eq!(outcome.previous, 60);
        assert_eq!(outcome.remaining, 0);
        assert!(outcome.floored);

        // Further deductions stay at zero.
        let outcome = ledger.deduct_minutes(user, 5).await.unwrap();
        assert_eq!(outcome.remaining, 0);
        assert!(ledger.minutes(user).await.unwrap() >= 0);
    }

    #[tokio::test]
    async fn test_deduct_rejects_negative() {
        let (ledger, _) = ledger_with_plan(Some(PlanId::Basic));
        assert!(ledger.deduct_minutes(Uuid::new_v4(), -3).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deductions_lose_nothing() {
        let (ledger, _) = ledger_with_plan(Some(PlanId::Pro));
        let ledger = Arc::new(ledger);
        let user = Uuid::new_v4();
        assert_eq!(ledger.minutes(user).await.unwrap(), 300);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(
                async move { ledger.deduct_minutes(user, 7).await },
            ));
        }
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert!(!outcome.floored);
        }

        // 300 - 10 * 7; a lost update would leave the balance higher.
        assert_eq!(ledger.minutes(user).await.unwrap(), 230);
    }

    #[tokio::test]
    async fn test_add_minutes_is_additive() {
        let (ledger, _) = ledger_with_plan(Some(PlanId::Basic));
        let user = Uuid::new_v4();

        assert_eq!(ledger.add_minutes(user, 40).await.unwrap(), 100);
        assert_eq!(ledger.minutes(user).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_set_plan_minutes_overwrites() {
        let (ledger, _) = ledger_with_plan(Some(PlanId::Basic));
        let user = Uuid::new_v4();

        ledger.deduct_minutes(user, 50).await.unwrap();
        assert_eq!(ledger.minutes(user).await.unwrap(), 10);

        // Plan upgrade resets the balance to the new grant, not 10 + 300.
        let granted = ledger.set_plan_minutes(user, PlanId::Pro).await.unwrap();
        assert_eq!(granted, 300);
        assert_eq!(ledger.minutes(user).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_usage_accumulates_within_period() {
        let (ledger, _) = ledger_with_plan(Some(PlanId::Basic));
        let user = Uuid::new_v4();

        ledger.increment_usage(user, 12).await.unwrap();
        ledger.increment_usage(user, 5).await.unwrap();
        assert_eq!(ledger.usage_this_period(user).await.unwrap(), 17);
    }

    #[test]
    fn test_period_key_format() {
        let at = DateTime::parse_from_rfc3339("2025-03-07T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(period_key(at), "2025-03");
    }
}
