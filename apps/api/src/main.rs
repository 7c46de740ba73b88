//! Dispatch portal API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;

use dispatch_core::AppError;
use tracing::info;

use crate::api_config::{ApiConfig, RateLimitStoreConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;

    let pool = match config.database_url.as_deref() {
        Some(database_url)
            if config.migrate_only || config.rate_limit_store == RateLimitStoreConfig::Postgres =>
        {
            Some(api_services::connect_and_migrate(database_url).await?)
        }
        _ => None,
    };

    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let app_state = api_services::build_app_state(pool, &config)?;
    let _cleanup_task = api_services::spawn_quota_cleanup(
        app_state.api_rate_limiter.clone(),
        config.rate_limit_cleanup_interval_seconds,
        config.rate_limit_retention_hours,
    );

    let app = api_router::build_router(app_state, &config.frontend_url)?;
    let address = config.socket_address()?;

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(
        %address,
        rate_limit_store = config.rate_limit_store.as_str(),
        "dispatch-api listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
