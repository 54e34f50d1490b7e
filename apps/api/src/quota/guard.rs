//! Quota decisions: may this user start an interview, create a resource,
//! and how long may a session run.
//!
//! All checks here are advisory pre-flights. Nothing is reserved; actual
//! spending happens when sessions finish. Two starts racing the same
//! remaining minutes can both pass the gate, and the ledger's floor-at-zero
//! deduction absorbs the overdraft.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::quota::catalog::{entitlement, PlanId};
use crate::quota::entitlements::{resolve_plan, EntitlementSource};
use crate::quota::ledger::PlanLedger;

pub const MINUTES_PER_QUESTION: i64 = 2;
pub const GRACE_MINUTES: i64 = 2;
pub const MAX_SESSION_MINUTES: i64 = 45;

/// Monthly-counted resources covered by the generic quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Interviews,
    JobTargets,
}

impl ResourceKind {
    pub fn parse(s: &str) -> Option<ResourceKind> {
        match s {
            "interviews" => Some(ResourceKind::Interviews),
            "job-targets" | "job_targets" => Some(ResourceKind::JobTargets),
            _ => None,
        }
    }
}

/// Monthly creation counts, read from the respective tables.
#[async_trait]
pub trait ResourceCounter: Send + Sync {
    async fn created_this_month(&self, user_id: Uuid, kind: ResourceKind)
        -> Result<i64, AppError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanInfo {
    pub plan: Option<PlanId>,
    pub is_subscribed: bool,
    pub minutes_granted: i64,
    pub interview_limit: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterviewGate {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub available_minutes: i64,
    pub required_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceQuota {
    pub allowed: bool,
    pub remaining: i64,
    pub limit: i64,
}

pub fn required_minutes(question_count: i64) -> i64 {
    question_count * MINUTES_PER_QUESTION
}

/// The interview gate decision, separated from I/O.
fn gate_decision(subscribed: bool, available: i64, required: i64) -> InterviewGate {
    if !subscribed {
        return InterviewGate {
            allowed: false,
            reason: Some("no active subscription".to_string()),
            available_minutes: available,
            required_minutes: required,
        };
    }
    if available < required {
        return InterviewGate {
            allowed: false,
            reason: Some(format!(
                "insufficient minutes: {required} required, {available} available"
            )),
            available_minutes: available,
            required_minutes: required,
        };
    }
    InterviewGate {
        allowed: true,
        reason: None,
        available_minutes: available,
        required_minutes: required,
    }
}

/// Session budget: estimated need plus slack, capped by the hard per-session
/// maximum and by what is left of the plan's minutes this period.
fn budget_minutes(question_count: i64, plan_minutes: i64, used_this_period: i64) -> i64 {
    let estimated = required_minutes(question_count) + GRACE_MINUTES;
    let period_remaining = plan_minutes - used_this_period;
    estimated.min(MAX_SESSION_MINUTES).min(period_remaining)
}

fn resource_decision(limit: i64, used: i64) -> ResourceQuota {
    ResourceQuota {
        allowed: used < limit,
        remaining: (limit - used).max(0),
        limit,
    }
}

pub struct QuotaGuard {
    ledger: Arc<PlanLedger>,
    entitlements: Arc<dyn EntitlementSource>,
    counter: Arc<dyn ResourceCounter>,
}

impl QuotaGuard {
    pub fn new(
        ledger: Arc<PlanLedger>,
        entitlements: Arc<dyn EntitlementSource>,
        counter: Arc<dyn ResourceCounter>,
    ) -> Self {
        Self {
            ledger,
            entitlements,
            counter,
        }
    }

    /// Highest plan the user holds, with its entitlements. No plan means
    /// zero entitlements, not an error.
    pub async fn plan_info(&self, user_id: Uuid) -> Result<PlanInfo, AppError> {
        let plan = resolve_plan(self.entitlements.as_ref(), user_id).await?;
        Ok(match plan {
            Some(p) => {
                let ent = entitlement(p);
                PlanInfo {
                    plan: Some(p),
                    is_subscribed: true,
                    minutes_granted: ent.minutes_granted,
                    interview_limit: ent.interview_limit,
                }
            }
            None => PlanInfo {
                plan: None,
                is_subscribed: false,
                minutes_granted: 0,
                interview_limit: 0,
            },
        })
    }

    /// Advisory pre-flight for starting an interview of `question_count`
    /// questions. Denials are answers, not errors.
    pub async fn can_start_interview(
        &self,
        user_id: Uuid,
        question_count: i64,
    ) -> Result<InterviewGate, AppError> {
        if question_count < 1 {
            return Err(AppError::Validation(
                "question_count must be at least 1".into(),
            ));
        }

        let plan = resolve_plan(self.entitlements.as_ref(), user_id).await?;
        let available = self.ledger.minutes(user_id).await?;
        Ok(gate_decision(
            plan.is_some(),
            available,
            required_minutes(question_count),
        ))
    }

    /// Generic monthly-count quota, independent of minutes.
    pub async fn quota_availability(
        &self,
        user_id: Uuid,
        kind: ResourceKind,
    ) -> Result<ResourceQuota, AppError> {
        let info = self.plan_info(user_id).await?;
        let limit = match (info.plan, kind) {
            (Some(p), ResourceKind::Interviews) => entitlement(p).interview_limit,
            (Some(p), ResourceKind::JobTargets) => entitlement(p).job_target_limit,
            (None, _) => 0,
        };
        if limit == 0 {
            return Ok(resource_decision(0, 0));
        }

        let used = self.counter.created_this_month(user_id, kind).await?;
        Ok(resource_decision(limit, used))
    }

    /// How long a session may run, in minutes. Zero or negative means the
    /// period budget is exhausted and no session may start.
    pub async fn session_budget_minutes(
        &self,
        user_id: Uuid,
        question_count: i64,
    ) -> Result<i64, AppError> {
        let info = self.plan_info(user_id).await?;
        if !info.is_subscribed {
            return Ok(0);
        }
        let used = self.ledger.usage_this_period(user_id).await?;
        Ok(budget_minutes(question_count, info.minutes_granted, used))
    }
}

#[cfg(test)]
pub struct FixedCounter(pub i64);

#[cfg(test)]
#[async_trait]
impl ResourceCounter for FixedCounter {
    async fn created_this_month(
        &self,
        _user_id: Uuid,
        _kind: ResourceKind,
    ) -> Result<i64, AppError> {
        Ok(self.0)
    }
}
