use axum::{Extension, Json};
use dispatch_domain::RateLimitDecision;

use crate::dto::{QuotaResponse, QuotaStatusResponse};

/// Reports the quota the rate-limit middleware recorded for this request.
pub async fn quota_status_handler(
    decision: Option<Extension<RateLimitDecision>>,
) -> Json<QuotaStatusResponse> {
    let quota = decision.map(|Extension(decision)| QuotaResponse::from(decision));

    Json(QuotaStatusResponse {
        tracked: quota.is_some(),
        quota,
    })
}
