use dispatch_domain::RateLimitDecision;
use serde::Serialize;
use ts_rs::TS;

/// Health response payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub rate_limit_store: &'static str,
    pub postgres: HealthDependencyStatus,
    pub redis: HealthDependencyStatus,
}

/// One runtime dependency health status.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-dependency-status.ts"
)]
pub struct HealthDependencyStatus {
    pub status: &'static str,
    pub detail: Option<String>,
}

/// Quota metadata returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/quota-response.ts"
)]
pub struct QuotaResponse {
    pub success: bool,
    pub limit: i64,
    pub remaining: i64,
    pub reset: i64,
}

impl From<RateLimitDecision> for QuotaResponse {
    fn from(decision: RateLimitDecision) -> Self {
        Self {
            success: decision.allowed,
            limit: decision.limit,
            remaining: decision.remaining,
            reset: decision.reset_seconds,
        }
    }
}

/// Quota status of the calling client.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/quota-status-response.ts"
)]
pub struct QuotaStatusResponse {
    /// False when the caller could not be identified or the store was unavailable.
    pub tracked: bool,
    pub quota: Option<QuotaResponse>,
}
