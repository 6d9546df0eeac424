//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::orchestrator::OrchestrationError;
use crate::pipeline::segmentation::SegmentationError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unreadable PDF: {0}")]
    UnreadablePdf(String),
    #[error("Unknown document: {0}")]
    DocumentNotFound(String),
    #[error("Report not available: {0}")]
    ArtifactUnavailable(String),
    #[error(transparent)]
    Extraction(#[from] OrchestrationError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut phase = None;
        let mut kind = None;
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::UnreadablePdf(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNREADABLE_PDF",
                detail.clone(),
            ),
            ApiError::DocumentNotFound(doc_id) => (
                StatusCode::NOT_FOUND,
                "DOCUMENT_NOT_FOUND",
                format!("No parsed document with id {doc_id}; upload it again"),
            ),
            ApiError::ArtifactUnavailable(report_id) => (
                StatusCode::NOT_FOUND,
                "ARTIFACT_UNAVAILABLE",
                format!("No report with id {report_id}"),
            ),
            ApiError::Extraction(err) => {
                phase = Some(err.phase.to_string());
                kind = Some(err.source.kind().to_string());
                (StatusCode::BAD_GATEWAY, "EXTRACTION_FAILED", err.to_string())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                phase,
                kind,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<SegmentationError> for ApiError {
    fn from(err: SegmentationError) -> Self {
        ApiError::UnreadablePdf(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    use crate::models::enums::Phase;
    use crate::pipeline::gateway::GatewayError;

    async fn json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn bad_request_returns_400() {
        let response = ApiError::BadRequest("No file".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert!(json["error"].get("phase").is_none());
    }

    #[tokio::test]
    async fn segmentation_error_returns_422() {
        let response = ApiError::from(SegmentationError::NoPages).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(response).await["error"]["code"], "UNREADABLE_PDF");
    }

    #[tokio::test]
    async fn unknown_report_returns_artifact_unavailable() {
        let response = ApiError::ArtifactUnavailable("r-1".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"]["code"], "ARTIFACT_UNAVAILABLE");
    }

    #[tokio::test]
    async fn extraction_failure_is_phase_and_kind_tagged() {
        let err = OrchestrationError {
            phase: Phase::VendorControls,
            source: GatewayError::RateLimited("throttled".into()),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = json(response).await;
        assert_eq!(json["error"]["code"], "EXTRACTION_FAILED");
        assert_eq!(json["error"]["phase"], "vendor_controls");
        assert_eq!(json["error"]["kind"], "rate_limited");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("lock poisoned".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(response).await["error"]["message"], "An internal error occurred");
    }
}
