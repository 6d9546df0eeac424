//! HTTP router.
//!
//! NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::endpoints;
use crate::api::types::AppState;

/// Largest accepted upload, including multipart overhead.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn api_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/parse", post(endpoints::documents::parse))
        .route("/extract/:doc_id", post(endpoints::extraction::extract))
        .route("/download/:report_id", get(endpoints::reports::download))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(cors)
}
