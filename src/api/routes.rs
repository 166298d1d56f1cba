//! API Routes
//!
//! Configures the Axum router with all operations endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cache_report_handler, cleanup_handler, health_handler, invalidate_handler, notify_handler,
    publish_handler, push_handler, stats_handler, urge_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /stats` - Cache and push queue statistics
/// - `GET /cache/report` - Smart cache optimization report
/// - `POST /cache/cleanup` - Sweep expired entries now
/// - `POST /cache/invalidate` - Drop db cache keys containing a pattern
/// - `POST /submissions/:id/notify` - Fan out a review notice
/// - `POST /submissions/:id/publish` - Post to channels and groups
/// - `POST /submissions/:id/urge` - Push a review reminder
/// - `POST /push` - Queue a push notification
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/cache/report", get(cache_report_handler))
        .route("/cache/cleanup", post(cleanup_handler))
        .route("/cache/invalidate", post(invalidate_handler))
        .route("/submissions/:id/notify", post(notify_handler))
        .route("/submissions/:id/publish", post(publish_handler))
        .route("/submissions/:id/urge", post(urge_handler))
        .route("/push", post(push_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
