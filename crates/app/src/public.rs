use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use aqua_talent_core::types::{CompanyStatus, JobType, SubscriptionPlan};
use aqua_talent_storage::{JobFilter, PublicJob};

use crate::problem::{parse_param, ProblemResponse};
use crate::router::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct JobSearchParams {
    pub q: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Job board listing: approved jobs of approved companies.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobSearchParams>,
) -> Result<Json<Vec<PublicJob>>, ProblemResponse> {
    let filter = JobFilter {
        query: non_blank(params.q),
        location: non_blank(params.location),
        job_type: parse_param::<JobType>("job_type", params.job_type.as_deref())?,
    };
    let jobs = state.storage().jobs().list_public(&filter).await?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicJob>, ProblemResponse> {
    let job = state.storage().jobs().fetch_public(&id).await?;
    Ok(Json(job))
}

/// Public company page with its open jobs. Unapproved companies are hidden.
pub async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ProblemResponse> {
    let company = state.storage().companies().fetch(&id).await?;
    if company.status != CompanyStatus::Approved {
        return Err(ProblemResponse::not_found("company"));
    }
    let jobs: Vec<PublicJob> = state
        .storage()
        .jobs()
        .list_public(&JobFilter::default())
        .await?
        .into_iter()
        .filter(|listing| listing.job.company_id == company.id)
        .collect();

    Ok(Json(json!({
        "id": company.id,
        "name": company.name,
        "industry": company.industry,
        "location": company.location,
        "website": company.website,
        "description": company.description,
        "jobs": jobs,
    })))
}

/// Active subscription plans offered to students.
pub async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubscriptionPlan>>, ProblemResponse> {
    let plans = state.storage().plans().list(true).await?;
    Ok(Json(plans))
}

#[cfg(test)]
mod tests {
    use crate::testing::{send, setup};
    use aqua_talent_core::types::{CompanyStatus, JobStatus};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn job_board_hides_unapproved_postings() {
        let ctx = setup().await;
        let (company_id, _) = ctx.register_company("hr@aqua.test").await;
        ctx.decide_company(&company_id, CompanyStatus::Approved).await;
        let live = ctx.seed_job(&company_id, "Rust Intern", JobStatus::Approved).await;
        ctx.seed_job(&company_id, "Hidden Draft", JobStatus::Draft).await;

        let (status, body) = send(&ctx.app, Method::GET, "/jobs", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let listed = body.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["id"], live.as_str());
        assert_eq!(listed[0]["company_name"], "Aqua Works");

        let (status, body) = send(&ctx.app, Method::GET, "/jobs?q=rust&job_type=internship", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(&ctx.app, Method::GET, "/jobs?job_type=gig", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "invalid_parameter");
    }

    #[tokio::test]
    async fn pending_companies_are_not_public() {
        let ctx = setup().await;
        let (company_id, _) = ctx.register_company("hr@aqua.test").await;

        let path = format!("/companies/{company_id}");
        let (status, _) = send(&ctx.app, Method::GET, &path, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        ctx.decide_company(&company_id, CompanyStatus::Approved).await;
        let (status, body) = send(&ctx.app, Method::GET, &path, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Aqua Works");
    }

    #[tokio::test]
    async fn services_list_active_plans() {
        let ctx = setup().await;
        let (status, body) = send(&ctx.app, Method::GET, "/services", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|plan| plan["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["plan-free", "plan-premium"]);
    }
}
