use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use aqua_talent_core::types::{
    Application, ApplicationStatus, Company, JobPosting, JobStatus, JobType, Role,
};
use aqua_talent_storage::{ApplicationDetail, CompanyProfileUpdate, JobContentUpdate};

use crate::auth::{required_text, CompanyUser};
use crate::problem::{json_body, ProblemResponse};
use crate::router::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCompanyProfile {
    pub name: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub job_type: JobType,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<JobType>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub requirements: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationDecision {
    pub status: ApplicationStatus,
}

pub async fn get_profile(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
) -> Result<Json<Company>, ProblemResponse> {
    let company = state.storage().companies().fetch(&company_id).await?;
    Ok(Json(company))
}

pub async fn update_profile(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
    payload: Result<Json<UpdateCompanyProfile>, JsonRejection>,
) -> Result<Json<Company>, ProblemResponse> {
    let request = json_body(payload)?;
    let update = CompanyProfileUpdate {
        name: request
            .name
            .as_deref()
            .map(|name| required_text("name", name))
            .transpose()?,
        industry: request.industry,
        location: request.location,
        website: request.website,
        description: request.description,
    };
    let company = state
        .storage()
        .companies()
        .update_profile(&company_id, &update, state.now())
        .await?;
    Ok(Json(company))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
) -> Result<Json<Vec<JobPosting>>, ProblemResponse> {
    let jobs = state.storage().jobs().list_by_company(&company_id).await?;
    Ok(Json(jobs))
}

/// Creates a job as a draft.
pub async fn create_job(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobPosting>), ProblemResponse> {
    let request = json_body(payload)?;
    validate_salary(request.salary_min, request.salary_max)?;

    let now = state.now();
    let job = JobPosting {
        id: Uuid::new_v4().to_string(),
        company_id,
        title: required_text("title", &request.title)?,
        description: required_text("description", &request.description)?,
        location: request.location,
        job_type: request.job_type,
        salary_min: request.salary_min,
        salary_max: request.salary_max,
        requirements: clean_list(request.requirements),
        status: JobStatus::Draft,
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    };
    state.storage().jobs().insert(&job).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
    Path(job_id): Path<String>,
) -> Result<Json<JobPosting>, ProblemResponse> {
    let job = owned_job(&state, &company_id, &job_id).await?;
    Ok(Json(job))
}

/// Edits job content while the job is still a draft or was rejected.
pub async fn update_job(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
    Path(job_id): Path<String>,
    payload: Result<Json<UpdateJobRequest>, JsonRejection>,
) -> Result<Json<JobPosting>, ProblemResponse> {
    let request = json_body(payload)?;
    let job = owned_job(&state, &company_id, &job_id).await?;
    if !job.status.is_editable() {
        return Err(not_editable(job.status));
    }
    validate_salary(
        request.salary_min.or(job.salary_min),
        request.salary_max.or(job.salary_max),
    )?;

    let update = JobContentUpdate {
        title: request
            .title
            .as_deref()
            .map(|title| required_text("title", title))
            .transpose()?,
        description: request
            .description
            .as_deref()
            .map(|description| required_text("description", description))
            .transpose()?,
        location: request.location,
        job_type: request.job_type,
        salary_min: request.salary_min,
        salary_max: request.salary_max,
        requirements: request.requirements.map(clean_list),
    };
    // The status may have moved since it was read; the update re-checks it.
    match state
        .storage()
        .jobs()
        .update_content(&job_id, &update, state.now())
        .await?
    {
        Some(updated) => Ok(Json(updated)),
        None => {
            let current = state.storage().jobs().fetch(&job_id).await?;
            Err(not_editable(current.status))
        }
    }
}

fn not_editable(status: JobStatus) -> ProblemResponse {
    ProblemResponse::conflict("job_not_editable", format!("a {status} job cannot be edited"))
}

/// Deletes a draft job.
pub async fn delete_job(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
    Path(job_id): Path<String>,
) -> Result<StatusCode, ProblemResponse> {
    owned_job(&state, &company_id, &job_id).await?;
    if state.storage().jobs().delete_draft(&job_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ProblemResponse::conflict(
            "job_not_deletable",
            "only draft jobs can be deleted",
        ))
    }
}

pub async fn submit_job(
    state: State<AppState>,
    company: CompanyUser,
    job_id: Path<String>,
) -> Result<Json<JobPosting>, ProblemResponse> {
    move_job(state, company, job_id, JobStatus::Pending).await
}

pub async fn unpublish_job(
    state: State<AppState>,
    company: CompanyUser,
    job_id: Path<String>,
) -> Result<Json<JobPosting>, ProblemResponse> {
    move_job(state, company, job_id, JobStatus::Unpublished).await
}

pub async fn republish_job(
    state: State<AppState>,
    company: CompanyUser,
    job_id: Path<String>,
) -> Result<Json<JobPosting>, ProblemResponse> {
    move_job(state, company, job_id, JobStatus::Approved).await
}

pub async fn close_job(
    state: State<AppState>,
    company: CompanyUser,
    job_id: Path<String>,
) -> Result<Json<JobPosting>, ProblemResponse> {
    move_job(state, company, job_id, JobStatus::Closed).await
}

async fn move_job(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
    Path(job_id): Path<String>,
    target: JobStatus,
) -> Result<Json<JobPosting>, ProblemResponse> {
    let job = state
        .workflow()
        .transition_job(Role::Company, &company_id, &job_id, target, None)
        .await?;
    Ok(Json(job))
}

pub async fn list_job_applications(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<ApplicationDetail>>, ProblemResponse> {
    owned_job(&state, &company_id, &job_id).await?;
    let applications = state.storage().applications().list_for_job(&job_id).await?;
    Ok(Json(applications))
}

/// Hires or rejects a reviewed applicant.
pub async fn decide_application(
    State(state): State<AppState>,
    CompanyUser(company_id): CompanyUser,
    Path(application_id): Path<String>,
    payload: Result<Json<ApplicationDecision>, JsonRejection>,
) -> Result<Json<Application>, ProblemResponse> {
    let request = json_body(payload)?;
    let application = state
        .workflow()
        .transition_application(Role::Company, &company_id, &application_id, request.status)
        .await?;
    Ok(Json(application))
}

async fn owned_job(
    state: &AppState,
    company_id: &str,
    job_id: &str,
) -> Result<JobPosting, ProblemResponse> {
    let job = state.storage().jobs().fetch(job_id).await?;
    if job.company_id != company_id {
        return Err(ProblemResponse::forbidden("job belongs to another company"));
    }
    Ok(job)
}

fn validate_salary(min: Option<i64>, max: Option<i64>) -> Result<(), ProblemResponse> {
    if min.is_some_and(|value| value < 0) || max.is_some_and(|value| value < 0) {
        return Err(ProblemResponse::bad_request(
            "invalid_salary",
            "salary must not be negative",
        ));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ProblemResponse::bad_request(
                "invalid_salary",
                "salary_min must not exceed salary_max",
            ));
        }
    }
    Ok(())
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}
