//! API Route Configuration

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{self, AppState};

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health & Stats
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        // Processing control
        .route("/processing/start", post(handlers::start_processing))
        .route("/processing/stop", post(handlers::stop_processing))
        .route("/processing/status", get(handlers::get_status))
        // Tokens
        .route("/tokens", post(handlers::add_token))
        .route("/tokens/process", post(handlers::process_token));

    Router::new()
        .nest("/v1", api_v1)
        // Also expose at root for convenience
        .route("/health", get(handlers::health_check))
        .with_state(state)
        // Middleware (order matters - bottom runs first)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
