//! Router assembly: REST API under /api/v1, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - verification/progress/rating/variable API under `/api/v1/...`
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route(
            "/api/v1/verify",
            post(http::http_post_verify)
                .get(http::http_get_verify)
                .delete(http::http_delete_verify),
        )
        .route("/api/v1/rating", post(http::http_post_rating))
        .route("/api/v1/variable/protected", put(http::http_put_variable_protected))
        .route("/api/v1/variable/shared", put(http::http_put_variable_shared))
        .route("/api/v1/variable/user", put(http::http_put_variable_user))
        .route("/api/v1/variable", get(http::http_get_variable))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
