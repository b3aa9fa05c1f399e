//! API Routes
//!
//! Configures the Axum router with the operational endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    budget_status_handler, cache_stats_handler, get_budget_config_handler, health_handler,
    invalidate_handler, monitor_handler, tag_keys_handler, tags_handler,
    update_budget_config_handler, usage_report_handler, user_usage_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /cache/stats` - Hit/miss counters and sampled top keys
/// - `POST /cache/invalidate` - Invalidate by tags or key pattern
/// - `GET /cache/tags` - List known tags
/// - `GET /cache/tags/:tag` - Keys indexed under a tag
/// - `GET /budget/usage` - Per-service usage and top endpoints
/// - `GET /budget/users/:user_id/usage` - Per-service usage of one user
/// - `GET /budget/:service/status` - Budget status for a period
/// - `GET|PUT /budget/:service/config` - Read or update a budget config
/// - `POST /budget/monitor` - Run the budget alert sweep now
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
        .route("/cache/stats", get(cache_stats_handler))
        .route("/cache/invalidate", post(invalidate_handler))
        .route("/cache/tags", get(tags_handler))
        .route("/cache/tags/:tag", get(tag_keys_handler))
        .route("/budget/usage", get(usage_report_handler))
        .route("/budget/monitor", post(monitor_handler))
        .route("/budget/users/:user_id/usage", get(user_usage_handler))
        .route("/budget/:service/status", get(budget_status_handler))
        .route(
            "/budget/:service/config",
            get(get_budget_config_handler).put(update_budget_config_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
