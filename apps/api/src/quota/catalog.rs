use serde::{Deserialize, Serialize};

/// Subscription tiers, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Basic,
    Pro,
    Premium,
}

impl PlanId {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanId::Basic => "basic",
            PlanId::Pro => "pro",
            PlanId::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<PlanId> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Some(PlanId::Basic),
            "pro" => Some(PlanId::Pro),
            "premium" => Some(PlanId::Premium),
            _ => None,
        }
    }
}

/// What a plan grants. Minutes are the once-per-plan balance grant;
/// the two limits are monthly counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEntitlement {
    pub plan: PlanId,
    pub minutes_granted: i64,
    pub interview_limit: i64,
    pub job_target_limit: i64,
}

pub fn entitlement(plan: PlanId) -> PlanEntitlement {
    match plan {
        PlanId::Premium => PlanEntitlement {
            plan,
            minutes_granted: 1000,
            interview_limit: 150,
            job_target_limit: 100,
        },
        PlanId::Pro => PlanEntitlement {
            plan,
            minutes_granted: 300,
            interview_limit: 40,
            job_target_limit: 25,
        },
        PlanId::Basic => PlanEntitlement {
            plan,
            minutes_granted: 60,
            interview_limit: 10,
            job_target_limit: 5,
        },
    }
}

/// Membership checks walk tiers in this order; the first match wins, so a
/// user holding several plans is treated as their highest.
pub fn tiers_highest_first() -> [PlanEntitlement; 3] {
    [
        entitlement(PlanId::Premium),
        entitlement(PlanId::Pro),
        entitlement(PlanId::Basic),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(PlanId::parse("Premium"), Some(PlanId::Premium));
        assert_eq!(PlanId::parse(" pro "), Some(PlanId::Pro));
        assert_eq!(PlanId::parse("enterprise"), None);
    }

    #[test]
    fn test_tier_order_is_descending() {
        let tiers = tiers_highest_first();
        assert!(tiers[0].minutes_granted > tiers[1].minutes_granted);
        assert!(tiers[1].minutes_granted > tiers[2].minutes_granted);
        assert!(tiers[0].interview_limit > tiers[2].interview_limit);
    }

    #[test]
    fn test_plan_ordering_matches_tiers() {
        assert!(PlanId::Premium > PlanId::Pro);
        assert!(PlanId::Pro > PlanId::Basic);
    }
}
