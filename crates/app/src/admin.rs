use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use aqua_talent_core::types::{
    Application, ApplicationStatus, BillingPeriod, Company, CompanyStatus, JobPosting, JobStatus,
    PlanTier, Role, Student, SubscriptionPlan,
};
use aqua_talent_storage::{ApplicationDetail, PlanChanges};

use crate::auth::{required_text, AdminUser};
use crate::problem::{json_body, parse_param, ProblemResponse};
use crate::router::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompanyDecisionRequest {
    pub status: CompanyStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JobModerationRequest {
    pub status: JobStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationScreeningRequest {
    pub status: ApplicationStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignSubscriptionRequest {
    pub plan_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub tier: PlanTier,
    #[serde(default)]
    pub price_cents: i64,
    pub currency: Option<String>,
    pub billing_period: BillingPeriod,
    pub application_quota: Option<u32>,
    #[serde(default)]
    pub features: Vec<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub tier: Option<PlanTier>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub billing_period: Option<BillingPeriod>,
    /// `null` switches the plan to unlimited; omitting it keeps the quota.
    #[serde(default, deserialize_with = "present")]
    pub application_quota: Option<Option<u32>>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct PlatformStats {
    pub companies: BTreeMap<&'static str, i64>,
    pub jobs: BTreeMap<&'static str, i64>,
    pub applications: BTreeMap<&'static str, i64>,
    pub students: StudentStats,
    pub plans: usize,
}

#[derive(Debug, Serialize)]
pub struct StudentStats {
    pub total: i64,
    pub hired: i64,
}

pub async fn list_companies(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Company>>, ProblemResponse> {
    let status = parse_param::<CompanyStatus>("status", filter.status.as_deref())?;
    let companies = state.storage().companies().list(status).await?;
    Ok(Json(companies))
}

pub async fn decide_company(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(company_id): Path<String>,
    payload: Result<Json<CompanyDecisionRequest>, JsonRejection>,
) -> Result<Json<Company>, ProblemResponse> {
    let request = json_body(payload)?;
    let company = state
        .workflow()
        .decide_company(&company_id, request.status, request.reason.as_deref())
        .await?;
    Ok(Json(company))
}

pub async fn list_students(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Student>>, ProblemResponse> {
    let students = state.storage().students().list().await?;
    Ok(Json(students))
}

pub async fn assign_subscription(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(student_id): Path<String>,
    payload: Result<Json<AssignSubscriptionRequest>, JsonRejection>,
) -> Result<Json<Student>, ProblemResponse> {
    let request = json_body(payload)?;
    let student = state
        .workflow()
        .assign_subscription(&student_id, request.plan_id.trim())
        .await?;
    Ok(Json(student))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<JobPosting>>, ProblemResponse> {
    let status = parse_param::<JobStatus>("status", filter.status.as_deref())?;
    let jobs = state.storage().jobs().list(status).await?;
    Ok(Json(jobs))
}

/// Approves, rejects, unpublishes or closes any job.
pub async fn moderate_job(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(job_id): Path<String>,
    payload: Result<Json<JobModerationRequest>, JsonRejection>,
) -> Result<Json<JobPosting>, ProblemResponse> {
    let request = json_body(payload)?;
    let job = state
        .workflow()
        .transition_job(
            Role::Admin,
            &admin_id,
            &job_id,
            request.status,
            request.reason.as_deref(),
        )
        .await?;
    Ok(Json(job))
}

pub async fn list_applications(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<ApplicationDetail>>, ProblemResponse> {
    let status = parse_param::<ApplicationStatus>("status", filter.status.as_deref())?;
    let applications = state.storage().applications().list(status).await?;
    Ok(Json(applications))
}

/// First screening step: forwards a pending application to the company or rejects it.
pub async fn screen_application(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(application_id): Path<String>,
    payload: Result<Json<ApplicationScreeningRequest>, JsonRejection>,
) -> Result<Json<Application>, ProblemResponse> {
    let request = json_body(payload)?;
    let application = state
        .workflow()
        .transition_application(Role::Admin, &admin_id, &application_id, request.status)
        .await?;
    Ok(Json(application))
}

pub async fn list_plans(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<SubscriptionPlan>>, ProblemResponse> {
    let plans = state.storage().plans().list(false).await?;
    Ok(Json(plans))
}

pub async fn create_plan(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<CreatePlanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubscriptionPlan>), ProblemResponse> {
    let request = json_body(payload)?;
    validate_price(request.price_cents)?;
    let now = state.now();
    let plan = SubscriptionPlan {
        id: Uuid::new_v4().to_string(),
        name: required_text("name", &request.name)?,
        tier: request.tier,
        price_cents: request.price_cents,
        currency: normalize_currency(request.currency.as_deref().unwrap_or("USD"))?,
        billing_period: request.billing_period,
        application_quota: request.application_quota,
        features: request.features,
        is_active: request.is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    state.storage().plans().insert(&plan).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn update_plan(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(plan_id): Path<String>,
    payload: Result<Json<UpdatePlanRequest>, JsonRejection>,
) -> Result<Json<SubscriptionPlan>, ProblemResponse> {
    let request = json_body(payload)?;
    if let Some(price) = request.price_cents {
        validate_price(price)?;
    }
    let changes = PlanChanges {
        name: request
            .name
            .as_deref()
            .map(|name| required_text("name", name))
            .transpose()?,
        tier: request.tier,
        price_cents: request.price_cents,
        currency: request
            .currency
            .as_deref()
            .map(normalize_currency)
            .transpose()?,
        billing_period: request.billing_period,
        application_quota: request.application_quota,
        features: request.features,
        is_active: request.is_active,
    };

    let plans = state.storage().plans();
    let mut plan = plans.fetch(&plan_id).await?;
    changes.apply(&mut plan, state.now());
    plans.update(&plan).await?;
    Ok(Json(plan))
}

/// Deletes a plan nobody is subscribed to.
pub async fn delete_plan(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(plan_id): Path<String>,
) -> Result<StatusCode, ProblemResponse> {
    let subscribers = state.storage().students().count_on_plan(&plan_id).await?;
    if subscribers > 0 {
        return Err(ProblemResponse::conflict(
            "plan_in_use",
            format!("{subscribers} student(s) are subscribed; deactivate the plan instead"),
        ));
    }
    state.storage().plans().delete(&plan_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<PlatformStats>, ProblemResponse> {
    let storage = state.storage();
    let (total, hired) = storage.students().counts().await?;
    let stats = PlatformStats {
        companies: fill_counts(
            CompanyStatus::ALL.iter().map(|status| status.as_str()),
            storage.companies().count_by_status().await?,
        ),
        jobs: fill_counts(
            JobStatus::ALL.iter().map(|status| status.as_str()),
            storage.jobs().count_by_status().await?,
        ),
        applications: fill_counts(
            ApplicationStatus::ALL.iter().map(|status| status.as_str()),
            storage.applications().count_by_status().await?,
        ),
        students: StudentStats { total, hired },
        plans: storage.plans().list(true).await?.len(),
    };
    Ok(Json(stats))
}

/// Every known status appears, including those with no rows.
fn fill_counts(
    statuses: impl Iterator<Item = &'static str>,
    counted: Vec<(String, i64)>,
) -> BTreeMap<&'static str, i64> {
    statuses
        .map(|status| {
            let count = counted
                .iter()
                .find(|(name, _)| name == status)
                .map(|(_, count)| *count)
                .unwrap_or(0);
            (status, count)
        })
        .collect()
}

fn validate_price(price_cents: i64) -> Result<(), ProblemResponse> {
    if price_cents < 0 {
        return Err(ProblemResponse::bad_request(
            "invalid_price",
            "price_cents must not be negative",
        ));
    }
    Ok(())
}

fn normalize_currency(raw: &str) -> Result<String, ProblemResponse> {
    let currency = raw.trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ProblemResponse::bad_request(
            "invalid_currency",
            "currency must be a three letter code",
        ));
    }
    Ok(currency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bearer, send, setup};
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn fill_counts_zero_fills_missing_statuses() {
        let counts = fill_counts(
            CompanyStatus::ALL.iter().map(|status| status.as_str()),
            vec![("approved".to_string(), 3)],
        );
        assert_eq!(counts["approved"], 3);
        assert_eq!(counts["pending"], 0);
        assert_eq!(counts["rejected"], 0);
    }

    #[test]
    fn update_plan_distinguishes_null_from_absent() {
        let absent: UpdatePlanRequest = serde_json::from_value(json!({ "name": "Pro" })).unwrap();
        assert_eq!(absent.application_quota, None);

        let unlimited: UpdatePlanRequest =
            serde_json::from_value(json!({ "application_quota": null })).unwrap();
        assert_eq!(unlimited.application_quota, Some(None));

        let limited: UpdatePlanRequest =
            serde_json::from_value(json!({ "application_quota": 20 })).unwrap();
        assert_eq!(limited.application_quota, Some(Some(20)));
    }

    #[tokio::test]
    async fn rejecting_a_company_requires_a_reason() {
        let ctx = setup().await;
        let admin = bearer(&ctx.admin_token().await);
        let (company_id, _) = ctx.register_company("hr@aqua.test").await;
        let path = format!("/admin/companies/{company_id}");

        let (status, body) = send(
            &ctx.app,
            Method::PATCH,
            &path,
            Some(&admin),
            Some(json!({ "status": "rejected", "reason": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "reason_required");

        let (status, body) = send(
            &ctx.app,
            Method::PATCH,
            &path,
            Some(&admin),
            Some(json!({ "status": "rejected", "reason": "Unverifiable address" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rejection_reason"], "Unverifiable address");

        let (_, body) = send(&ctx.app, Method::GET, "/admin/companies?status=rejected", Some(&admin), None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(
            &ctx.app,
            Method::PATCH,
            &path,
            Some(&admin),
            Some(json!({ "status": "approved" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["rejection_reason"].is_null());
    }

    #[tokio::test]
    async fn plan_in_use_cannot_be_deleted() {
        let ctx = setup().await;
        let admin = bearer(&ctx.admin_token().await);
        let (student_id, _) = ctx.register_student("rina@example.test").await;

        let (status, body) = send(
            &ctx.app,
            Method::POST,
            "/admin/plans",
            Some(&admin),
            Some(json!({
                "name": "Campus",
                "tier": "paid",
                "price_cents": 1500,
                "currency": "idr",
                "billing_period": "yearly",
                "application_quota": 30,
                "features": ["Priority review"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["currency"], "IDR");
        let plan_id = body["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &ctx.app,
            Method::POST,
            &format!("/admin/students/{student_id}/subscription"),
            Some(&admin),
            Some(json!({ "plan_id": plan_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let plan_path = format!("/admin/plans/{plan_id}");
        let (status, body) = send(&ctx.app, Method::DELETE, &plan_path, Some(&admin), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["type"], "plan_in_use");

        let (status, body) = send(
            &ctx.app,
            Method::PATCH,
            &plan_path,
            Some(&admin),
            Some(json!({ "is_active": false, "application_quota": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_active"], false);
        assert!(body["application_quota"].is_null());

        let (status, body) = send(
            &ctx.app,
            Method::POST,
            &format!("/admin/students/{student_id}/subscription"),
            Some(&admin),
            Some(json!({ "plan_id": plan_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["type"], "plan_inactive");
    }

    #[tokio::test]
    async fn stats_include_zero_counts() {
        let ctx = setup().await;
        let admin = bearer(&ctx.admin_token().await);
        ctx.register_company("hr@aqua.test").await;
        ctx.register_student("rina@example.test").await;

        let (status, body) = send(&ctx.app, Method::GET, "/admin/stats", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["companies"]["pending"], 1);
        assert_eq!(body["companies"]["approved"], 0);
        assert_eq!(body["jobs"]["closed"], 0);
        assert_eq!(body["students"]["total"], 1);
        assert_eq!(body["students"]["hired"], 0);
        assert_eq!(body["plans"], 2);
    }

    #[tokio::test]
    async fn non_admins_are_forbidden() {
        let ctx = setup().await;
        let (_, token) = ctx.register_company("hr@aqua.test").await;
        let (status, _) = send(&ctx.app, Method::GET, "/admin/stats", Some(&bearer(&token)), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
