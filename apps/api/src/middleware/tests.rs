use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Router};
use chrono::{DateTime, Utc};
use dispatch_application::{ManualClock, QuotaStore, RateLimiter};
use dispatch_core::{AppError, AppResult};
use dispatch_domain::{QuotaRecord, RateLimitPolicy};
use dispatch_infrastructure::InMemoryQuotaStore;
use tower::ServiceExt;

use super::rate_limit;
use crate::api_config::RateLimitFailurePolicy;
use crate::state::AppState;

struct UnavailableQuotaStore;

#[async_trait]
impl QuotaStore for UnavailableQuotaStore {
    async fn load(&self, _key: &str) -> AppResult<Option<QuotaRecord>> {
        Err(AppError::Store("connection refused".to_owned()))
    }

    async fn save(&self, _key: &str, _record: &QuotaRecord) -> AppResult<()> {
        Err(AppError::Store("connection refused".to_owned()))
    }

    async fn purge_stale(&self, _before: DateTime<Utc>) -> AppResult<u64> {
        Err(AppError::Store("connection refused".to_owned()))
    }
}

fn limited_router(limiter: RateLimiter, failure_policy: RateLimitFailurePolicy) -> Router {
    let state = AppState::for_tests(limiter.clone(), limiter.clone(), failure_policy);

    Router::new()
        .route("/limited", get(|| async { "ok" }))
        .route_layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(Extension(limiter))
        .with_state(state)
}

fn memory_limiter(store: Arc<InMemoryQuotaStore>) -> RateLimiter {
    RateLimiter::new(store, RateLimitPolicy::new("api", 3, 60, 300))
        .with_clock(Arc::new(ManualClock::new(Utc::now())))
}

fn request_from(client: &str) -> Request<Body> {
    match Request::builder()
        .uri("/limited")
        .header("x-forwarded-for", client)
        .body(Body::empty())
    {
        Ok(request) => request,
        Err(error) => panic!("failed to build request: {error}"),
    }
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    match router.clone().oneshot(request).await {
        Ok(response) => response,
        Err(error) => panic!("request failed: {error}"),
    }
}

fn header(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = match to_bytes(response.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(error) => panic!("failed to read body: {error}"),
    };
    serde_json::from_slice(&bytes).unwrap_or_default()
}

#[tokio::test]
async fn allowed_responses_carry_quota_headers() {
    let router = limited_router(
        memory_limiter(Arc::new(InMemoryQuotaStore::new())),
        RateLimitFailurePolicy::Open,
    );

    let response = send(&router, request_from("198.51.100.7")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("3"));
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("2"));
    assert_eq!(header(&response, "x-ratelimit-reset").as_deref(), Some("60"));
}

#[tokio::test]
async fn exhausted_clients_receive_too_many_requests() {
    let router = limited_router(
        memory_limiter(Arc::new(InMemoryQuotaStore::new())),
        RateLimitFailurePolicy::Open,
    );

    for _ in 0..3 {
        let response = send(&router, request_from("198.51.100.7")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&router, request_from("198.51.100.7")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("0"));
    assert_eq!(header(&response, "x-ratelimit-reset").as_deref(), Some("300"));
    assert_eq!(header(&response, "retry-after").as_deref(), Some("300"));
    assert_eq!(
        json_body(response).await,
        serde_json::json!({"error": {"message": "Too many requests", "code": "RATE_LIMITED"}})
    );

    let other_client = send(&router, request_from("198.51.100.8")).await;
    assert_eq!(other_client.status(), StatusCode::OK);
}

#[tokio::test]
async fn unidentified_clients_are_not_tracked() {
    let store = Arc::new(InMemoryQuotaStore::new());
    let router = limited_router(memory_limiter(store.clone()), RateLimitFailurePolicy::Open);

    let request = match Request::builder().uri("/limited").body(Body::empty()) {
        Ok(request) => request,
        Err(error) => panic!("failed to build request: {error}"),
    };
    let response = send(&router, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "x-ratelimit-limit").is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn peer_address_identifies_clients_without_forwarded_header() {
    let store = Arc::new(InMemoryQuotaStore::new());
    let router = limited_router(memory_limiter(store.clone()), RateLimitFailurePolicy::Open);

    let mut request = match Request::builder().uri("/limited").body(Body::empty()) {
        Ok(request) => request,
        Err(error) => panic!("failed to build request: {error}"),
    };
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 52_000))));
    let response = send(&router, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(matches!(store.load("api:10.0.0.9").await, Ok(Some(_))));
}

#[tokio::test]
async fn store_failures_fail_open_when_configured() {
    let limiter = RateLimiter::new(
        Arc::new(UnavailableQuotaStore),
        RateLimitPolicy::new("api", 3, 60, 300),
    );
    let router = limited_router(limiter, RateLimitFailurePolicy::Open);

    let response = send(&router, request_from("198.51.100.7")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "x-ratelimit-limit").is_none());
}

#[tokio::test]
async fn store_failures_fail_closed_when_configured() {
    let limiter = RateLimiter::new(
        Arc::new(UnavailableQuotaStore),
        RateLimitPolicy::new("api", 3, 60, 300),
    );
    let router = limited_router(limiter, RateLimitFailurePolicy::Closed);

    let response = send(&router, request_from("198.51.100.7")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "STORE_UNAVAILABLE");
}
