//! Health check endpoint.

use axum::Json;

use crate::api::types::HealthResponse;

/// `GET /health` — liveness probe.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
    })
}
