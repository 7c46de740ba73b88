use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use dispatch_core::AppError;
use dispatch_domain::RateLimitPolicy;
use ipnet::IpNet;
use tracing_subscriber::EnvFilter;

/// Backend holding quota records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStoreConfig {
    Memory,
    Postgres,
    Redis,
}

impl RateLimitStoreConfig {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres => "postgres",
            Self::Redis => "redis",
        }
    }
}

/// What the middleware does when the quota store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitFailurePolicy {
    /// Let the request through unlimited.
    Open,
    /// Reject the request with 503.
    Closed,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub api_host: String,
    pub api_port: u16,
    pub frontend_url: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub rate_limit_store: RateLimitStoreConfig,
    pub api_rate_limit: RateLimitPolicy,
    pub auth_rate_limit: RateLimitPolicy,
    pub rate_limit_failure_policy: RateLimitFailurePolicy,
    pub trusted_proxies: Vec<IpNet>,
    pub rate_limit_retention_hours: i64,
    pub rate_limit_cleanup_interval_seconds: u64,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        Self::from_source(migrate_only, |name| env::var(name).ok())
    }

    pub fn from_source(
        migrate_only: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_host = lookup("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = lookup("API_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);
        let frontend_url =
            lookup("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_owned());
        let database_url = lookup("DATABASE_URL");
        let redis_url = lookup("REDIS_URL");

        let rate_limit_store = match lookup("RATE_LIMIT_STORE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => RateLimitStoreConfig::Memory,
            "postgres" => RateLimitStoreConfig::Postgres,
            "redis" => RateLimitStoreConfig::Redis,
            other => {
                return Err(AppError::Validation(format!(
                    "RATE_LIMIT_STORE must be one of 'memory', 'postgres', 'redis', got '{other}'"
                )));
            }
        };

        if (rate_limit_store == RateLimitStoreConfig::Postgres || migrate_only)
            && database_url.is_none()
        {
            return Err(AppError::Validation(
                "DATABASE_URL is required when RATE_LIMIT_STORE=postgres or when migrating"
                    .to_owned(),
            ));
        }
        if rate_limit_store == RateLimitStoreConfig::Redis && redis_url.is_none() {
            return Err(AppError::Validation(
                "REDIS_URL is required when RATE_LIMIT_STORE=redis".to_owned(),
            ));
        }

        let api_rate_limit = RateLimitPolicy::new(
            lookup("RATE_LIMIT_KEY_PREFIX").unwrap_or_else(|| "api".to_owned()),
            parse_i64(&lookup, "RATE_LIMIT_POINTS", 100)?,
            parse_i64(&lookup, "RATE_LIMIT_DURATION_SECONDS", 60)?,
            parse_i64(&lookup, "RATE_LIMIT_BLOCK_SECONDS", 60)?,
        );
        let auth_rate_limit = RateLimitPolicy::new(
            lookup("AUTH_RATE_LIMIT_KEY_PREFIX").unwrap_or_else(|| "auth".to_owned()),
            parse_i64(&lookup, "AUTH_RATE_LIMIT_POINTS", 5)?,
            parse_i64(&lookup, "AUTH_RATE_LIMIT_DURATION_SECONDS", 15 * 60)?,
            parse_i64(&lookup, "AUTH_RATE_LIMIT_BLOCK_SECONDS", 15 * 60)?,
        );
        if api_rate_limit.key_prefix == auth_rate_limit.key_prefix {
            return Err(AppError::Validation(
                "RATE_LIMIT_KEY_PREFIX and AUTH_RATE_LIMIT_KEY_PREFIX must differ".to_owned(),
            ));
        }

        let rate_limit_failure_policy = match lookup("RATE_LIMIT_FAILURE_POLICY")
            .unwrap_or_else(|| "open".to_owned())
            .to_ascii_lowercase()
            .as_str()
        {
            "open" => RateLimitFailurePolicy::Open,
            "closed" => RateLimitFailurePolicy::Closed,
            other => {
                return Err(AppError::Validation(format!(
                    "RATE_LIMIT_FAILURE_POLICY must be either 'open' or 'closed', got '{other}'"
                )));
            }
        };

        let trusted_proxies = lookup("TRUSTED_PROXY_CIDRS")
            .map(|value| parse_trusted_proxies(value.as_str()))
            .transpose()?
            .unwrap_or_default();

        let rate_limit_retention_hours = parse_i64(&lookup, "RATE_LIMIT_RETENTION_HOURS", 24)?;
        let longest_policy_seconds = [&api_rate_limit, &auth_rate_limit]
            .iter()
            .map(|policy| policy.window_seconds.max(policy.block_seconds))
            .max()
            .unwrap_or_default();
        if rate_limit_retention_hours.saturating_mul(3600) < longest_policy_seconds {
            return Err(AppError::Validation(format!(
                "RATE_LIMIT_RETENTION_HOURS must cover the longest window or block ({longest_policy_seconds}s)"
            )));
        }

        let rate_limit_cleanup_interval_seconds = lookup("RATE_LIMIT_CLEANUP_INTERVAL_SECONDS")
            .map(|value| {
                value.parse::<u64>().map_err(|error| {
                    AppError::Validation(format!(
                        "invalid RATE_LIMIT_CLEANUP_INTERVAL_SECONDS: {error}"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(300);

        Ok(Self {
            migrate_only,
            api_host,
            api_port,
            frontend_url,
            database_url,
            redis_url,
            rate_limit_store,
            api_rate_limit,
            auth_rate_limit,
            rate_limit_failure_policy,
            trusted_proxies,
            rate_limit_retention_hours,
            rate_limit_cleanup_interval_seconds,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }

    pub fn rate_limit_retention_seconds(&self) -> u64 {
        u64::try_from(self.rate_limit_retention_hours.saturating_mul(3600)).unwrap_or(0)
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_i64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: i64,
) -> Result<i64, AppError> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<i64>()
                .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

fn parse_trusted_proxies(value: &str) -> Result<Vec<IpNet>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            IpNet::from_str(entry)
                .or_else(|_| IpAddr::from_str(entry).map(IpNet::from))
                .map_err(|error| {
                    AppError::Validation(format!("invalid TRUSTED_PROXY_CIDRS entry '{entry}': {error}"))
                })
        })
        .collect()
}
