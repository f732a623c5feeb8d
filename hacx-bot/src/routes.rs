//! Liveness HTTP routes.
//!
//! Hosting platforms probe these to keep the process up; they carry no
//! bot functionality.

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

/// Body of `GET /`.
pub const LIVENESS_TEXT: &str = "HacxGPT Telegram Bot is running!";

/// Per-request time limit for the liveness routes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn index() -> &'static str {
    LIVENESS_TEXT
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "hacx-bot",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the liveness router.
pub fn build_router() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}
