//! Router of the operations API.

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

/// Create the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let feed_routes = Router::new()
        .route("/feeds/:id", get(handlers::get_feed))
        .route(
            "/feeds/:id/delivery-records",
            get(handlers::list_delivery_records),
        )
        .route(
            "/feeds/:id/fetch-attempts",
            get(handlers::list_fetch_attempts),
        )
        .route("/feeds/:id/rate-limits", get(handlers::get_rate_limits))
        .route("/feeds/:id/retry", post(handlers::retry_feed))
        .route(
            "/feeds/:feed_id/connections/:connection_id",
            patch(handlers::update_connection),
        );

    Router::new()
        .nest("/api", feed_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(|| async { "OK" }))
}
