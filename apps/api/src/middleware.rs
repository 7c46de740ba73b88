use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use dispatch_application::RateLimiter;
use dispatch_domain::RateLimitDecision;
use tracing::{debug, info, warn};

use crate::api_config::RateLimitFailurePolicy;
use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

mod client_identifier;

#[cfg(test)]
mod tests;

pub use client_identifier::{UNKNOWN_CLIENT, resolve_client_identifier};

const X_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Spends one point of the caller's quota before running the route.
///
/// Denied callers get 429 with quota headers. Allowed responses carry the same
/// headers and the decision is exposed to handlers as a request extension.
pub async fn rate_limit(
    State(state): State<AppState>,
    Extension(limiter): Extension<RateLimiter>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip());
    let identifier =
        resolve_client_identifier(request.headers(), peer_ip, &state.trusted_proxies);

    if identifier == UNKNOWN_CLIENT {
        debug!(
            key_prefix = %limiter.policy().key_prefix,
            "skipping rate limit for unidentified client"
        );
        return next.run(request).await;
    }

    match limiter.check(identifier.as_str()).await {
        Ok(decision) if decision.allowed => {
            request.extensions_mut().insert(decision);
            let mut response = next.run(request).await;
            apply_quota_headers(response.headers_mut(), &decision);
            response
        }
        Ok(decision) => {
            info!(
                key_prefix = %limiter.policy().key_prefix,
                client = %identifier,
                reset = decision.reset_seconds,
                "request rejected by rate limiter"
            );
            too_many_requests(&decision)
        }
        Err(error) => match state.rate_limit_failure_policy {
            RateLimitFailurePolicy::Open => {
                warn!(
                    key_prefix = %limiter.policy().key_prefix,
                    error = %error,
                    "rate limit check failed, allowing request"
                );
                next.run(request).await
            }
            RateLimitFailurePolicy::Closed => {
                warn!(
                    key_prefix = %limiter.policy().key_prefix,
                    error = %error,
                    "rate limit check failed, rejecting request"
                );
                ApiError::from(error).into_response()
            }
        },
    }
}

fn too_many_requests(decision: &RateLimitDecision) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorResponse::new("Too many requests", "RATE_LIMITED")),
    )
        .into_response();

    let headers = response.headers_mut();
    apply_quota_headers(headers, decision);
    headers.insert(
        header::RETRY_AFTER,
        HeaderValue::from(decision.reset_seconds),
    );
    response
}

fn apply_quota_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(decision.reset_seconds));
}
