use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::str::FromStr;
use tracing::error;

use aqua_talent_core::lifecycle::{ApplyError, TransitionError};
use aqua_talent_storage::RepoError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// `application/problem+json` error returned by every handler.
#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn bad_request<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, problem_type, detail)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
    }

    pub fn unauthorized<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, problem_type, detail)
    }

    pub fn forbidden<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", detail)
    }

    pub fn conflict<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::CONFLICT, problem_type, detail)
    }

    pub fn internal<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", detail)
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[cfg(test)]
    pub fn problem_type(&self) -> &'static str {
        self.body.problem_type
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl From<RepoError> for ProblemResponse {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found("record"),
            RepoError::Conflict => Self::conflict("conflict", "record already exists"),
            RepoError::ForeignKey => {
                Self::conflict("reference_conflict", "record is referenced or references a missing record")
            }
            other => {
                error!(stage = "storage", error = %other, "repository operation failed");
                Self::internal("storage operation failed")
            }
        }
    }
}

impl From<TransitionError> for ProblemResponse {
    fn from(err: TransitionError) -> Self {
        let detail = err.to_string();
        match err {
            TransitionError::ReasonRequired => Self::bad_request("reason_required", detail),
            TransitionError::Forbidden { .. } => {
                Self::new(StatusCode::FORBIDDEN, "forbidden_transition", detail)
            }
            TransitionError::CompanyNotApproved => Self::conflict("company_not_approved", detail),
            TransitionError::Invalid { .. } | TransitionError::Unchanged { .. } => {
                Self::conflict("invalid_transition", detail)
            }
        }
    }
}

impl From<ApplyError> for ProblemResponse {
    fn from(err: ApplyError) -> Self {
        let problem_type = match err {
            ApplyError::StudentHired => "student_hired",
            ApplyError::JobNotOpen => "job_not_open",
            ApplyError::AlreadyApplied => "already_applied",
            ApplyError::QuotaExceeded { .. } => "quota_exceeded",
        };
        Self::conflict(problem_type, err.to_string())
    }
}

/// Unwraps a JSON body, turning extractor rejections into problem responses.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ProblemResponse> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ProblemResponse::bad_request("invalid_body", rejection.body_text()))
}

/// Parses an optional query parameter into a typed value.
pub fn parse_param<T>(name: &str, raw: Option<&str>) -> Result<Option<T>, ProblemResponse>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|err: T::Err| {
            ProblemResponse::bad_request("invalid_parameter", format!("{name}: {err}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqua_talent_core::types::JobStatus;

    #[test]
    fn transition_errors_map_to_statuses() {
        let invalid: ProblemResponse = TransitionError::Invalid {
            entity: "job",
            from: "closed",
            to: "approved",
        }
        .into();
        assert_eq!(invalid.status(), StatusCode::CONFLICT);

        let reason: ProblemResponse = TransitionError::ReasonRequired.into();
        assert_eq!(reason.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn apply_errors_keep_their_type() {
        let problem: ProblemResponse = ApplyError::QuotaExceeded { limit: 5 }.into();
        assert_eq!(problem.problem_type(), "quota_exceeded");
        assert_eq!(problem.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn parses_query_parameters() {
        assert_eq!(
            parse_param::<JobStatus>("status", Some("approved")).unwrap(),
            Some(JobStatus::Approved)
        );
        assert_eq!(parse_param::<JobStatus>("status", Some(" ")).unwrap(), None);
        let err = parse_param::<JobStatus>("status", Some("live")).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn response_uses_problem_content_type() {
        let response = ProblemResponse::not_found("job").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/problem+json"
        );
    }
}
