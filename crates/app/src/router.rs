use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;

use aqua_talent_core::portal::Portal;
use aqua_talent_storage::Database;

use crate::auth::TokenService;
use crate::workflow::WorkflowExecutor;
use crate::{admin, auth, company, inbox, public, student, telemetry};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    tokens: TokenService,
    clock: Clock,
    workflow: WorkflowExecutor,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, tokens: TokenService) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        let workflow = WorkflowExecutor::new(storage.clone(), clock.clone());
        Self {
            metrics,
            storage,
            tokens,
            clock,
            workflow,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock.clone();
        self.workflow = WorkflowExecutor::new(self.storage.clone(), clock);
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn workflow(&self) -> &WorkflowExecutor {
        &self.workflow
    }
}

pub fn app_router(state: AppState) -> Router {
    let auth_routes: Router<AppState> = Router::new()
        .route("/auth/register/student", post(auth::register_student))
        .route("/auth/register/company", post(auth::register_company))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me));

    let public_routes: Router<AppState> = Router::new()
        .route("/jobs", get(public::list_jobs))
        .route("/jobs/:id", get(public::get_job))
        .route("/companies/:id", get(public::get_company))
        .route("/services", get(public::list_services));

    let student_routes: Router<AppState> = Router::new()
        .route(
            "/student/profile",
            get(student::get_profile).patch(student::update_profile),
        )
        .route("/student/jobs/:id/apply", post(student::apply))
        .route("/student/applications", get(student::list_applications))
        .route(
            "/student/applications/:id/withdraw",
            post(student::withdraw),
        )
        .route("/student/quota", get(student::quota));

    let company_routes: Router<AppState> = Router::new()
        .route(
            "/company/profile",
            get(company::get_profile).patch(company::update_profile),
        )
        .route(
            "/company/jobs",
            get(company::list_jobs).post(company::create_job),
        )
        .route(
            "/company/jobs/:id",
            get(company::get_job)
                .patch(company::update_job)
                .delete(company::delete_job),
        )
        .route("/company/jobs/:id/submit", post(company::submit_job))
        .route("/company/jobs/:id/unpublish", post(company::unpublish_job))
        .route("/company/jobs/:id/republish", post(company::republish_job))
        .route("/company/jobs/:id/close", post(company::close_job))
        .route(
            "/company/jobs/:id/applications",
            get(company::list_job_applications),
        )
        .route(
            "/company/applications/:id",
            patch(company::decide_application),
        );

    let admin_routes: Router<AppState> = Router::new()
        .route("/admin/companies", get(admin::list_companies))
        .route("/admin/companies/:id", patch(admin::decide_company))
        .route("/admin/students", get(admin::list_students))
        .route(
            "/admin/students/:id/subscription",
            post(admin::assign_subscription),
        )
        .route("/admin/jobs", get(admin::list_jobs))
        .route("/admin/jobs/:id", patch(admin::moderate_job))
        .route("/admin/applications", get(admin::list_applications))
        .route("/admin/applications/:id", patch(admin::screen_application))
        .route(
            "/admin/plans",
            get(admin::list_plans).post(admin::create_plan),
        )
        .route(
            "/admin/plans/:id",
            patch(admin::update_plan).delete(admin::delete_plan),
        )
        .route("/admin/stats", get(admin::stats));

    let inbox_routes: Router<AppState> = Router::new()
        .route("/notifications", get(inbox::list))
        .route("/notifications/unread-count", get(inbox::unread_count))
        .route("/notifications/read-all", post(inbox::mark_all_read))
        .route("/notifications/:id/read", post(inbox::mark_read));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/portal", get(portal))
        .merge(auth_routes)
        .merge(public_routes)
        .merge(student_routes)
        .merge(company_routes)
        .merge(admin_routes)
        .merge(inbox_routes)
        .layer(middleware::from_fn(telemetry::record_request))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

/// Resolves the portal for the request's `Host` header.
pub fn request_portal(headers: &HeaderMap) -> Portal {
    Portal::from_host(
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok()),
    )
}

async fn portal(headers: HeaderMap) -> Json<serde_json::Value> {
    let portal = request_portal(&headers);
    Json(json!({
        "portal": portal,
        "home_role": portal.home_role(),
    }))
}
