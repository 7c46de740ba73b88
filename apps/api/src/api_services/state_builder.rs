use std::sync::Arc;

use dispatch_application::{QuotaStore, RateLimiter};
use dispatch_core::{AppError, AppResult};
use dispatch_infrastructure::{InMemoryQuotaStore, PostgresQuotaStore, RedisQuotaStore};
use sqlx::PgPool;

use crate::api_config::{ApiConfig, RateLimitStoreConfig};
use crate::state::AppState;

use super::redis::build_redis_client;

const REDIS_QUOTA_NAMESPACE: &str = "dispatch:rate_limit";

pub fn build_app_state(pool: Option<PgPool>, config: &ApiConfig) -> Result<AppState, AppError> {
    let redis_client = config
        .redis_url
        .as_deref()
        .map(build_redis_client)
        .transpose()?;

    let quota_store = build_quota_store(pool.as_ref(), redis_client.as_ref(), config)?;

    Ok(AppState {
        api_rate_limiter: RateLimiter::new(quota_store.clone(), config.api_rate_limit.clone()),
        auth_rate_limiter: RateLimiter::new(quota_store, config.auth_rate_limit.clone()),
        rate_limit_failure_policy: config.rate_limit_failure_policy,
        rate_limit_store: config.rate_limit_store,
        trusted_proxies: config.trusted_proxies.clone(),
        postgres_pool: pool,
        redis_client,
    })
}

fn build_quota_store(
    pool: Option<&PgPool>,
    redis_client: Option<&redis::Client>,
    config: &ApiConfig,
) -> AppResult<Arc<dyn QuotaStore>> {
    match config.rate_limit_store {
        RateLimitStoreConfig::Memory => Ok(Arc::new(InMemoryQuotaStore::new())),
        RateLimitStoreConfig::Postgres => {
            let pool = pool.ok_or_else(|| {
                AppError::Validation(
                    "a database connection is required when RATE_LIMIT_STORE=postgres".to_owned(),
                )
            })?;
            Ok(Arc::new(PostgresQuotaStore::new(pool.clone())))
        }
        RateLimitStoreConfig::Redis => {
            let redis_client = redis_client.ok_or_else(|| {
                AppError::Validation("REDIS_URL is required when RATE_LIMIT_STORE=redis".to_owned())
            })?;
            Ok(Arc::new(RedisQuotaStore::new(
                redis_client.clone(),
                REDIS_QUOTA_NAMESPACE,
                config.rate_limit_retention_seconds(),
            )))
        }
    }
}
