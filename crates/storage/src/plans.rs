use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteExecutor, SqlitePool};

use aqua_talent_core::types::{BillingPeriod, PlanTier, SubscriptionPlan};

use crate::{decode_list, encode_list, parse_enum, to_rfc3339, RepoError, Tx};

const PLAN_COLUMNS: &str = "id, name, tier, price_cents, currency, billing_period, \
     application_quota, features_json, is_active, created_at, updated_at";

/// Repository for subscription plans.
#[derive(Clone)]
pub struct PlanRepository {
    pool: SqlitePool,
}

/// Partial plan update. `application_quota: Some(None)` switches to unlimited.
#[derive(Debug, Default, Clone)]
pub struct PlanChanges {
    pub name: Option<String>,
    pub tier: Option<PlanTier>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub billing_period: Option<BillingPeriod>,
    pub application_quota: Option<Option<u32>>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl PlanChanges {
    /// Applies the changes onto a loaded plan.
    pub fn apply(self, plan: &mut SubscriptionPlan, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            plan.name = name;
        }
        if let Some(tier) = self.tier {
            plan.tier = tier;
        }
        if let Some(price_cents) = self.price_cents {
            plan.price_cents = price_cents;
        }
        if let Some(currency) = self.currency {
            plan.currency = currency;
        }
        if let Some(billing_period) = self.billing_period {
            plan.billing_period = billing_period;
        }
        if let Some(quota) = self.application_quota {
            plan.application_quota = quota;
        }
        if let Some(features) = self.features {
            plan.features = features;
        }
        if let Some(is_active) = self.is_active {
            plan.is_active = is_active;
        }
        plan.updated_at = now;
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: String,
    name: String,
    tier: String,
    price_cents: i64,
    currency: String,
    billing_period: String,
    application_quota: Option<i64>,
    features_json: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PlanRow {
    fn into_domain(self) -> Result<SubscriptionPlan, RepoError> {
        let application_quota = self
            .application_quota
            .map(u32::try_from)
            .transpose()
            .map_err(|err| RepoError::Decode {
                column: "application_quota",
                reason: err.to_string(),
            })?;

        Ok(SubscriptionPlan {
            tier: parse_enum("tier", &self.tier)?,
            billing_period: parse_enum("billing_period", &self.billing_period)?,
            features: decode_list("features_json", &self.features_json)?,
            application_quota,
            id: self.id,
            name: self.name,
            price_cents: self.price_cents,
            currency: self.currency,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

async fn fetch_with<'e>(
    executor: impl SqliteExecutor<'e>,
    id: &str,
) -> Result<SubscriptionPlan, RepoError> {
    let query = format!("SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE id = ?");
    sqlx::query_as::<_, PlanRow>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(RepoError::NotFound)?
        .into_domain()
}

impl PlanRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists plans by price; `active_only` hides retired plans.
    pub async fn list(&self, active_only: bool) -> Result<Vec<SubscriptionPlan>, RepoError> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans \
             WHERE (?1 = 0 OR is_active = 1) ORDER BY price_cents ASC, name ASC"
        );
        let rows = sqlx::query_as::<_, PlanRow>(&query)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PlanRow::into_domain).collect()
    }

    pub async fn fetch(&self, id: &str) -> Result<SubscriptionPlan, RepoError> {
        fetch_with(&self.pool, id).await
    }

    pub async fn fetch_in(&self, tx: &mut Tx<'_>, id: &str) -> Result<SubscriptionPlan, RepoError> {
        fetch_with(&mut **tx, id).await
    }

    /// First active free plan, used for students without an assigned plan.
    pub async fn default_free(&self, tx: &mut Tx<'_>) -> Result<Option<SubscriptionPlan>, RepoError> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans \
             WHERE tier = 'free' AND is_active = 1 ORDER BY created_at ASC, id ASC LIMIT 1"
        );
        let row = sqlx::query_as::<_, PlanRow>(&query)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(PlanRow::into_domain).transpose()
    }

    pub async fn insert(&self, plan: &SubscriptionPlan) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO subscription_plans \
             (id, name, tier, price_cents, currency, billing_period, application_quota, features_json, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&plan.id)
        .bind(&plan.name)
        .bind(plan.tier.as_str())
        .bind(plan.price_cents)
        .bind(&plan.currency)
        .bind(plan.billing_period.as_str())
        .bind(plan.application_quota.map(i64::from))
        .bind(encode_list(&plan.features))
        .bind(plan.is_active)
        .bind(to_rfc3339(plan.created_at))
        .bind(to_rfc3339(plan.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrites every mutable column with the values in `plan`.
    pub async fn update(&self, plan: &SubscriptionPlan) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE subscription_plans SET \
                 name = ?, tier = ?, price_cents = ?, currency = ?, billing_period = ?, \
                 application_quota = ?, features_json = ?, is_active = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&plan.name)
        .bind(plan.tier.as_str())
        .bind(plan.price_cents)
        .bind(&plan.currency)
        .bind(plan.billing_period.as_str())
        .bind(plan.application_quota.map(i64::from))
        .bind(encode_list(&plan.features))
        .bind(plan.is_active)
        .bind(to_rfc3339(plan.updated_at))
        .bind(&plan.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    /// Deletes a plan; fails with [`RepoError::ForeignKey`] while students use it.
    pub async fn delete(&self, id: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM subscription_plans WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
