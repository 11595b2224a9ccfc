use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use aqua_talent_core::quota::QuotaStatus;
use aqua_talent_core::types::{Application, ApplicationStatus, Role, Student};
use aqua_talent_storage::{ApplicationDetail, StudentProfileUpdate};

use crate::auth::{required_text, StudentUser};
use crate::problem::{json_body, ProblemResponse};
use crate::router::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateStudentProfile {
    pub full_name: Option<String>,
    pub university: Option<String>,
    pub major: Option<String>,
    pub graduation_year: Option<i32>,
    pub skills: Option<Vec<String>>,
    pub bio: Option<String>,
    pub resume_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplyRequest {
    pub cover_letter: Option<String>,
}

pub async fn get_profile(
    State(state): State<AppState>,
    StudentUser(student_id): StudentUser,
) -> Result<Json<Student>, ProblemResponse> {
    let student = state.storage().students().fetch(&student_id).await?;
    Ok(Json(student))
}

pub async fn update_profile(
    State(state): State<AppState>,
    StudentUser(student_id): StudentUser,
    payload: Result<Json<UpdateStudentProfile>, JsonRejection>,
) -> Result<Json<Student>, ProblemResponse> {
    let request = json_body(payload)?;
    let full_name = request
        .full_name
        .as_deref()
        .map(|name| required_text("full_name", name))
        .transpose()?;
    let skills = request.skills.map(|skills| {
        skills
            .into_iter()
            .map(|skill| skill.trim().to_string())
            .filter(|skill| !skill.is_empty())
            .collect()
    });

    let update = StudentProfileUpdate {
        full_name,
        university: request.university,
        major: request.major,
        graduation_year: request.graduation_year,
        skills,
        bio: request.bio,
        resume_url: request.resume_url,
    };
    let student = state
        .storage()
        .students()
        .update_profile(&student_id, &update, state.now())
        .await?;
    Ok(Json(student))
}

/// Applies to a job. A request without a JSON body carries no cover letter.
pub async fn apply(
    State(state): State<AppState>,
    StudentUser(student_id): StudentUser,
    Path(job_id): Path<String>,
    payload: Result<Json<ApplyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Application>), ProblemResponse> {
    let request = match payload {
        Err(JsonRejection::MissingJsonContentType(_)) => ApplyRequest::default(),
        other => json_body(other)?,
    };
    let cover_letter = request.cover_letter;
    let application = state
        .workflow()
        .apply(&student_id, &job_id, cover_letter)
        .await?;
    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn list_applications(
    State(state): State<AppState>,
    StudentUser(student_id): StudentUser,
) -> Result<Json<Vec<ApplicationDetail>>, ProblemResponse> {
    let applications = state
        .storage()
        .applications()
        .list_for_student(&student_id)
        .await?;
    Ok(Json(applications))
}

pub async fn withdraw(
    State(state): State<AppState>,
    StudentUser(student_id): StudentUser,
    Path(application_id): Path<String>,
) -> Result<Json<Application>, ProblemResponse> {
    let application = state
        .workflow()
        .transition_application(
            Role::Student,
            &student_id,
            &application_id,
            ApplicationStatus::Withdrawn,
        )
        .await?;
    Ok(Json(application))
}

pub async fn quota(
    State(state): State<AppState>,
    StudentUser(student_id): StudentUser,
) -> Result<Json<QuotaStatus>, ProblemResponse> {
    let quota = state.workflow().quota(&student_id).await?;
    Ok(Json(quota))
}
