use std::{
    sync::{Mutex, OnceLock},
    time::Instant,
};

use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{
    BuildError as PrometheusBuildError, PrometheusBuilder, PrometheusHandle,
};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{
    fmt::{self as tracing_fmt, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use aqua_talent_util::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] PrometheusBuildError),
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_INSTALL_GUARD: Mutex<()> = Mutex::new(());
static START_TIME: OnceLock<Instant> = OnceLock::new();

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_git_sha() -> &'static str {
    option_env!("GIT_SHA").unwrap_or("unknown")
}

/// Installs the global subscriber: pretty output locally, JSON lines in production.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base = tracing_fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_timer(UtcTime::rfc_3339());

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.environment {
        Environment::Production => registry.with(base.json()).try_init()?,
        Environment::Development | Environment::Test => registry
            .with(base.event_format(tracing_fmt::format().pretty()))
            .try_init()?,
    }

    TRACING_INIT.set(()).ok();
    tracing::info!(
        stage = "telemetry",
        env = %config.environment.as_str(),
        version = BUILD_VERSION,
        git_sha = build_git_sha(),
        "tracing initialized"
    );
    Ok(())
}

/// Installs the Prometheus recorder once per process and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let _guard = METRICS_INSTALL_GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    METRICS_HANDLE.set(handle.clone()).ok();
    describe_metrics();
    START_TIME.get_or_init(Instant::now);

    Ok(handle)
}

fn describe_metrics() {
    describe_gauge!("app_build_info", "Build metadata for the running binary");
    describe_gauge!("app_uptime_seconds", "Seconds since the process started");
    describe_counter!(
        "auth_logins_total",
        "Count of login attempts, labelled by role and result"
    );
    describe_counter!(
        "auth_registrations_total",
        "Count of successful account registrations, labelled by role"
    );
    describe_counter!(
        "status_transitions_total",
        "Count of committed status transitions, labelled by entity and target status"
    );
    describe_counter!(
        "applications_submitted_total",
        "Count of applications created by students"
    );
    describe_counter!(
        "applications_auto_rejected_total",
        "Count of open applications rejected because their job was closed"
    );
    describe_counter!(
        "notifications_emitted_total",
        "Count of notifications persisted, labelled by kind"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        "Latency of HTTP requests in seconds, labelled by method and status"
    );
}

/// Middleware recording request latency per method and status code.
pub async fn record_request(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16().to_string();
    debug!(
        stage = "http",
        %method,
        %path,
        %status,
        elapsed_ms = elapsed.as_millis() as u64,
        "request served"
    );
    histogram!("http_request_duration_seconds", "method" => method, "status" => status)
        .record(elapsed.as_secs_f64());
    response
}

pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }

    body.push_str("# TYPE app_build_info gauge\n");
    body.push_str(&format!(
        "app_build_info{{version=\"{}\",git=\"{}\"}} 1\n",
        BUILD_VERSION,
        build_git_sha()
    ));

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs_f64())
        .unwrap_or_default();
    body.push_str("# TYPE app_uptime_seconds gauge\n");
    body.push_str(&format!("app_uptime_seconds {uptime}\n"));

    body
}
