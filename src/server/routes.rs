//! Router configuration for the HTTP server.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Build the router: submission and status under `/api/v1/jobs`, guarded
/// by the `X-API-Key` middleware, plus an unauthenticated health check.
pub fn create_router(state: AppState) -> Router {
    let jobs = Router::new()
        .route("/process-invoice", post(handlers::process_invoice))
        .route("/:job_id/status", get(handlers::job_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), handlers::require_api_key));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1/jobs", jobs)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
