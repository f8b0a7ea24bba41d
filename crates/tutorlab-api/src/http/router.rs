//! Axum router configuration with middleware.
//!
//! Middleware: CORS, request tracing, and a per-request timeout on every
//! route except `/chat`, whose stream may legitimately run for minutes.

use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_timeout = Duration::from_millis(state.config.server.request_timeout_ms);

    let timed_routes = Router::new()
        // Auth
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/verify", post(handlers::auth::verify))
        // Progress
        .route(
            "/progress",
            get(handlers::progress::get_progress).post(handlers::progress::save_progress),
        )
        .route(
            "/progress/completed-dates",
            get(handlers::progress::completed_dates),
        )
        .route("/messages", get(handlers::progress::today_messages))
        // Topics
        .route("/topics/current", get(handlers::topics::current_topic))
        // Admin
        .route("/admin/users", get(handlers::admin::list_users))
        .route("/admin/set-progress", post(handlers::admin::set_progress))
        .route("/admin/set-quota", post(handlers::admin::set_quota))
        .route(
            "/admin/trigger-daily-reset",
            post(handlers::admin::trigger_daily_reset),
        )
        .route("/health", get(health_check))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ));

    // Streaming chat: no request timeout.
    let stream_routes = Router::new().route("/chat", post(handlers::chat::chat));

    Router::new()
        .merge(timed_routes)
        .merge(stream_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sweeps": state.scheduler.totals(),
        "activeTokens": state.tokens.len(),
    }))
}
