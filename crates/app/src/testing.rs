//! Shared fixtures for router and workflow tests.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use aqua_talent_core::types::{CompanyStatus, JobPosting, JobStatus, JobType, Role};
use aqua_talent_storage::Database;

use crate::auth::{hash_password, TokenService};
use crate::router::{app_router, AppState, Clock};
use crate::telemetry;

pub const TEST_PASSWORD: &str = "password123";

pub async fn setup_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("app.db").display());
    let database = Database::connect(&url).await.expect("connect");
    database.run_migrations().await.expect("migrations");
    (dir, database)
}

pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

pub struct TestContext {
    _dir: TempDir,
    pub state: AppState,
    pub app: Router,
}

pub async fn setup() -> TestContext {
    let (dir, database) = setup_db().await;
    let metrics = telemetry::init_metrics().expect("metrics");
    let tokens = TokenService::new(b"router-test-secret-value", Duration::from_secs(3600));
    let state = AppState::new(metrics, database, tokens)
        .with_clock(fixed_clock(Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()));
    let app = app_router(state.clone());
    TestContext {
        _dir: dir,
        state,
        app,
    }
}

impl TestContext {
    /// Registers a student through the API and returns `(id, token)`.
    pub async fn register_student(&self, email: &str) -> (String, String) {
        let (status, body) = send(
            &self.app,
            Method::POST,
            "/auth/register/student",
            None,
            Some(json!({ "email": email, "password": TEST_PASSWORD, "full_name": "Rina" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "register student: {body}");
        credentials(&body)
    }

    /// Registers a pending company through the API and returns `(id, token)`.
    pub async fn register_company(&self, email: &str) -> (String, String) {
        let (status, body) = send(
            &self.app,
            Method::POST,
            "/auth/register/company",
            None,
            Some(json!({ "email": email, "password": TEST_PASSWORD, "name": "Aqua Works" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "register company: {body}");
        credentials(&body)
    }

    pub async fn decide_company(&self, company_id: &str, status: CompanyStatus) {
        let reason = (status == CompanyStatus::Rejected).then_some("incomplete profile");
        self.state
            .workflow()
            .decide_company(company_id, status, reason)
            .await
            .expect("decide company");
    }

    /// Inserts a job directly in the given status and returns its id.
    pub async fn seed_job(&self, company_id: &str, title: &str, status: JobStatus) -> String {
        let now = self.state.now();
        let job = JobPosting {
            id: Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            title: title.to_string(),
            description: "Ship features with the team".into(),
            location: Some("Bandung".into()),
            job_type: JobType::Internship,
            salary_min: None,
            salary_max: None,
            requirements: Vec::new(),
            status,
            rejection_reason: (status == JobStatus::Rejected).then(|| "needs detail".into()),
            created_at: now,
            updated_at: now,
        };
        self.state.storage().jobs().insert(&job).await.expect("insert job");
        job.id
    }

    /// Bootstraps the administrator and returns a token for it.
    pub async fn admin_token(&self) -> String {
        let id = self
            .state
            .storage()
            .accounts()
            .upsert_admin("admin@aqua.test", &hash_password(TEST_PASSWORD), self.state.now())
            .await
            .expect("upsert admin");
        self.state
            .tokens()
            .issue(&id, Role::Admin, self.state.now())
            .expect("issue token")
    }
}

fn credentials(body: &Value) -> (String, String) {
    (
        body["profile"]["id"].as_str().expect("profile id").to_string(),
        body["token"].as_str().expect("token").to_string(),
    )
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub async fn read_json(response: Response<Body>) -> Value {
    let collected = response
        .into_body()
        .collect()
        .await
        .expect("body should read");
    let bytes = collected.to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    dispatch(app, builder, body).await
}

/// Sends a raw JSON body, for payloads `serde_json::Value` cannot express.
pub async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: &str,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let request = builder.body(Body::from(body.to_string())).expect("request");
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("handler should respond");
    let status = response.status();
    (status, read_json(response).await)
}

pub async fn send_with_host(
    app: &Router,
    host: &str,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, host);
    dispatch(app, builder, body).await
}

async fn dispatch(
    app: &Router,
    builder: axum::http::request::Builder,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("handler should respond");
    let status = response.status();
    (status, read_json(response).await)
}
