//! API module
//!
//! Contains HTTP request handlers and the router wiring them under `/api/v1`.

pub mod extract;
pub mod middleware;
pub mod services;
pub mod subscriptions;

use crate::state::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests
    pub status: String,
    /// Application name from configuration
    pub app: String,
    /// Crate version
    pub version: String,
}

/// GET /api/health - Liveness probe
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        app: state.app_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the application router with all routes and middleware
///
/// # Arguments
/// * `state` - Shared handler state
/// * `request_timeout` - Upper bound on handling a single request
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let api_v1 = Router::new()
        .route(
            "/services",
            get(services::list_services).post(services::add_service),
        )
        .route(
            "/services/:id",
            get(services::get_service)
                .put(services::update_service)
                .delete(services::remove_service),
        )
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::add_subscription),
        )
        .route(
            "/subscriptions/total",
            post(subscriptions::subscription_total),
        )
        .route(
            "/subscriptions/:id",
            get(subscriptions::get_subscription)
                .put(subscriptions::update_subscription)
                .delete(subscriptions::remove_subscription),
        );

    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/v1", api_v1)
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
