//! Router configuration for the coupon service.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::events::{get_event_stats, get_scan_history, list_active_events};
use crate::handlers::health::{health_check, readiness_check};
use crate::handlers::registrations::{register, scan};
use crate::state::AppState;

/// Build the complete Axum router.
///
/// Health checks sit at the root; all coupon endpoints live under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Registration and redemption (the core workflow)
        .route("/registrations", post(register))
        .route("/registrations/scan", post(scan))
        // Read-side listings and dashboards
        .route("/events", get(list_active_events))
        .route("/events/:id/stats", get(get_event_stats))
        .route("/events/:id/scan-history", get(get_scan_history));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
