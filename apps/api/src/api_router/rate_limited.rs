use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Extension, Router};

use crate::state::AppState;
use crate::{handlers, middleware};

pub(super) fn build_api_routes(app_state: AppState) -> Router<AppState> {
    let api_rate_limiter = app_state.api_rate_limiter.clone();

    Router::new()
        .route("/api/quota", get(handlers::quota::quota_status_handler))
        .route_layer(from_fn_with_state(app_state, middleware::rate_limit))
        .layer(Extension(api_rate_limiter))
}

pub(super) fn build_auth_routes(app_state: AppState) -> Router<AppState> {
    let auth_rate_limiter = app_state.auth_rate_limiter.clone();

    Router::new()
        .route("/auth/quota", get(handlers::quota::quota_status_handler))
        .route_layer(from_fn_with_state(app_state, middleware::rate_limit))
        .layer(Extension(auth_rate_limiter))
}
