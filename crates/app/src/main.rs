mod admin;
mod auth;
mod company;
mod inbox;
mod problem;
mod public;
mod router;
mod student;
mod telemetry;
mod workflow;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;

use chrono::Utc;
use tracing::info;

use aqua_talent_storage::Database;
use aqua_talent_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    if let Some(admin) = &config.admin {
        let email = admin.email.trim().to_lowercase();
        let id = database
            .accounts()
            .upsert_admin(&email, &auth::hash_password(&admin.password), Utc::now())
            .await?;
        info!(stage = "app", admin_id = %id, %email, "administrator account ready");
    }

    let tokens = auth::TokenService::new(&config.token_secret, config.token_ttl);
    let state = router::AppState::new(metrics, database, tokens);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
