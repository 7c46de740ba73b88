use dispatch_application::RateLimiter;
use ipnet::IpNet;
use sqlx::PgPool;

use crate::api_config::{RateLimitFailurePolicy, RateLimitStoreConfig};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub api_rate_limiter: RateLimiter,
    pub auth_rate_limiter: RateLimiter,
    pub rate_limit_failure_policy: RateLimitFailurePolicy,
    pub rate_limit_store: RateLimitStoreConfig,
    pub trusted_proxies: Vec<IpNet>,
    pub postgres_pool: Option<PgPool>,
    pub redis_client: Option<redis::Client>,
}

#[cfg(test)]
impl AppState {
    pub(crate) fn for_tests(
        api_rate_limiter: RateLimiter,
        auth_rate_limiter: RateLimiter,
        rate_limit_failure_policy: RateLimitFailurePolicy,
    ) -> Self {
        Self {
            api_rate_limiter,
            auth_rate_limiter,
            rate_limit_failure_policy,
            rate_limit_store: RateLimitStoreConfig::Memory,
            trusted_proxies: Vec::new(),
            postgres_pool: None,
            redis_client: None,
        }
    }
}
