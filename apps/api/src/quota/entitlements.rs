//! Plan membership lookup.
//!
//! Who holds which plan is owned by an external subscription directory; this
//! module only asks. The HTTP source is the production path. When no
//! directory is configured the stored `plan_type` column stands in, kept
//! current by the billing webhook.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::quota::catalog::{tiers_highest_first, PlanId};

#[async_trait]
pub trait EntitlementSource: Send + Sync {
    /// True when the user currently holds the given plan.
    async fn has_plan(&self, user_id: Uuid, plan: PlanId) -> Result<bool, AppError>;
}

/// Walks tiers highest first and returns the first plan the user holds.
/// A user on several plans is therefore treated as their highest tier.
pub async fn resolve_plan(
    source: &dyn EntitlementSource,
    user_id: Uuid,
) -> Result<Option<PlanId>, AppError> {
    for tier in tiers_highest_first() {
        if source.has_plan(user_id, tier.plan).await? {
            return Ok(Some(tier.plan));
        }
    }
    Ok(None)
}

// ─────────────────────────────────────────────────────────────────────────
// HTTP directory source
// ─────────────────────────────────────────────────────────────────────────

pub struct DirectoryEntitlements {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MembershipResponse {
    active: bool,
}

impl DirectoryEntitlements {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl EntitlementSource for DirectoryEntitlements {
    async fn has_plan(&self, user_id: Uuid, plan: PlanId) -> Result<bool, AppError> {
        let url = format!(
            "{}/v1/members/{}/plans/{}",
            self.base_url,
            user_id,
            plan.as_str()
        );

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("entitlement directory: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "entitlement directory returned {status} for user {user_id}"
            )));
        }

        let membership: MembershipResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("entitlement directory: {e}")))?;

        Ok(membership.active)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Stored-plan fallback
// ─────────────────────────────────────────────────────────────────────────

/// Reads the denormalized `users.plan_type` column. Used when no directory
/// URL is configured; the billing webhook is then the only writer of plans.
pub struct StoredPlanEntitlements {
    pool: PgPool,
}

impl StoredPlanEntitlements {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementSource for StoredPlanEntitlements {
    async fn has_plan(&self, user_id: Uuid, plan: PlanId) -> Result<bool, AppError> {
        let stored: Option<Option<String>> =
            sqlx::query_scalar("SELECT plan_type FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(stored
            .flatten()
            .and_then(|s| PlanId::parse(&s))
            .is_some_and(|held| held == plan))
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Test source
// ─────────────────────────────────────────────────────────────────────────

/// Fixed-plan source for tests.
#[cfg(test)]
pub struct StaticEntitlements(pub Option<PlanId>);

#[cfg(test)]
#[async_trait]
impl EntitlementSource for StaticEntitlements {
    async fn has_plan(&self, _user_id: Uuid, plan: PlanId) -> Result<bool, AppError> {
        Ok(self.0 == Some(plan))
    }
}
