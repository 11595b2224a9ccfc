use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use crate::types::{PlanTier, SubscriptionPlan};

/// Monthly applications granted when no free plan is configured.
pub const DEFAULT_FREE_QUOTA: u32 = 5;

/// Application allowance for a student in the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub tier: PlanTier,
    pub plan_id: Option<String>,
    pub limit: Option<u32>,
    pub used: u32,
    pub remaining: Option<u32>,
    pub window_start: DateTime<Utc>,
}

impl QuotaStatus {
    /// Builds the quota for the student's effective plan.
    ///
    /// `assigned` is the plan set on the student, `fallback` the first active
    /// free plan. Without either the built-in free allowance applies.
    pub fn resolve(
        assigned: Option<&SubscriptionPlan>,
        fallback: Option<&SubscriptionPlan>,
        used: u32,
        window_start: DateTime<Utc>,
    ) -> Self {
        let (tier, plan_id, limit) = match assigned.or(fallback) {
            Some(plan) => (plan.tier, Some(plan.id.clone()), plan.application_quota),
            None => (PlanTier::Free, None, Some(DEFAULT_FREE_QUOTA)),
        };

        Self {
            tier,
            plan_id,
            limit,
            used,
            remaining: limit.map(|limit| limit.saturating_sub(used)),
            window_start,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit.map(|limit| self.used >= limit).unwrap_or(false)
    }
}

/// Start of the UTC calendar month containing `now`.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BillingPeriod;

    fn plan(id: &str, tier: PlanTier, quota: Option<u32>) -> SubscriptionPlan {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        SubscriptionPlan {
            id: id.into(),
            name: id.into(),
            tier,
            price_cents: 0,
            currency: "USD".into(),
            billing_period: BillingPeriod::Monthly,
            application_quota: quota,
            features: Vec::new(),
            is_active: true,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn window_starts_at_first_of_month() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
        assert_eq!(
            window_start(now),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn assigned_plan_wins_over_fallback() {
        let paid = plan("premium", PlanTier::Paid, None);
        let free = plan("free", PlanTier::Free, Some(3));
        let start = window_start(Utc::now());

        let status = QuotaStatus::resolve(Some(&paid), Some(&free), 40, start);
        assert_eq!(status.tier, PlanTier::Paid);
        assert_eq!(status.remaining, None);
        assert!(!status.is_exhausted());

        let status = QuotaStatus::resolve(None, Some(&free), 3, start);
        assert_eq!(status.plan_id.as_deref(), Some("free"));
        assert_eq!(status.remaining, Some(0));
        assert!(status.is_exhausted());
    }

    #[test]
    fn builtin_allowance_without_plans() {
        let status = QuotaStatus::resolve(None, None, 2, window_start(Utc::now()));
        assert_eq!(status.limit, Some(DEFAULT_FREE_QUOTA));
        assert_eq!(status.remaining, Some(DEFAULT_FREE_QUOTA - 2));
    }
}
