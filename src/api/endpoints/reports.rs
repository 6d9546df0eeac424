//! Report download endpoint.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::AppState;

/// `GET /download/:report_id` — the rendered PDF as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Response, ApiError> {
    let artifact = state
        .reports
        .get(&report_id)
        .ok_or_else(|| ApiError::ArtifactUnavailable(report_id.clone()))?;

    let bytes = match tokio::fs::read(&artifact.path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(report_id = %report_id, path = %artifact.path.display(), "Report file missing");
            state.reports.remove(&report_id);
            return Err(ApiError::ArtifactUnavailable(report_id));
        }
        Err(e) => return Err(ApiError::Internal(format!("Cannot read report: {e}"))),
    };

    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
