//! HTTP routes.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::app::App;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/health", get(status))
}

async fn health() -> &'static str {
    "OK"
}

#[derive(serde::Serialize)]
struct StatusResponse {
    status: &'static str,
    sessions: usize,
}

async fn status(State(app): State<Arc<App>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        sessions: app.sessions.session_count(),
    })
}
