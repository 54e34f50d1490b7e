//! Postgres implementations of the quota storage traits.
//!
//! Every balance write is a single conditional statement so the guard and
//! the write are atomic on the database side; the ledger's CAS loop retries
//! on top of that. No transaction ever spans an await on another service.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::quota::catalog::PlanId;
use crate::quota::guard::{ResourceCounter, ResourceKind};
use crate::quota::ledger::{BalanceSnapshot, LedgerStore};

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn balance(&self, user_id: Uuid) -> Result<BalanceSnapshot, AppError> {
        let row: Option<(Option<i64>, Option<String>)> =
            sqlx::query_as("SELECT total_minutes, plan_type FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row
            .map(|(total_minutes, plan_type)| BalanceSnapshot {
                total_minutes,
                plan_type,
            })
            .unwrap_or_default())
    }

    async fn grant_if_unset(
        &self,
        user_id: Uuid,
        minutes: i64,
        plan: Option<PlanId>,
    ) -> Result<bool, AppError> {
        // Accounts are normally created by the directory sync; the upsert
        // tolerates a balance read arriving first. The WHERE clause makes
        // the grant apply at most once.
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, external_id, email, total_minutes, plan_type)
            VALUES ($1, $1::text, '', $2, $3)
            ON CONFLICT (id) DO UPDATE
                SET total_minutes = EXCLUDED.total_minutes,
                    plan_type = COALESCE(users.plan_type, EXCLUDED.plan_type),
                    updated_at = now()
                WHERE users.total_minutes IS NULL
            "#,
        )
        .bind(user_id)
        .bind(minutes)
        .bind(plan.map(|p| p.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn swap_balance(&self, user_id: Uuid, expected: i64, new: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET total_minutes = $3, updated_at = now()
             WHERE id = $1 AND total_minutes = $2",
        )
        .bind(user_id)
        .bind(expected)
        .bind(new)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_balance(&self, user_id: Uuid, minutes: i64, plan: PlanId) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, external_id, email, total_minutes, plan_type)
            VALUES ($1, $1::text, '', $2, $3)
            ON CONFLICT (id) DO UPDATE
                SET total_minutes = EXCLUDED.total_minutes,
                    plan_type = EXCLUDED.plan_type,
                    updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(minutes)
        .bind(plan.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_usage(&self, user_id: Uuid, period: &str, minutes: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO usage_periods (user_id, period, minutes_used)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, period) DO UPDATE
                SET minutes_used = usage_periods.minutes_used + EXCLUDED.minutes_used
            "#,
        )
        .bind(user_id)
        .bind(period)
        .bind(minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn usage(&self, user_id: Uuid, period: &str) -> Result<i64, AppError> {
        let used: Option<i64> = sqlx::query_scalar(
            "SELECT minutes_used FROM usage_periods WHERE user_id = $1 AND period = $2",
        )
        .bind(user_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(used.unwrap_or(0))
    }
}

pub struct PgResourceCounter {
    pool: PgPool,
}

impl PgResourceCounter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceCounter for PgResourceCounter {
    async fn created_this_month(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
    ) -> Result<i64, AppError> {
        let table = match kind {
            ResourceKind::Interviews => "interviews",
            ResourceKind::JobTargets => "job_targets",
        };

        // Table name comes from the enum above, never from input.
        let query = format!(
            "SELECT COUNT(*) FROM {table}
             WHERE user_id = $1 AND created_at >= date_trunc('month', now())"
        );

        let count: i64 = sqlx::query_scalar(&query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
