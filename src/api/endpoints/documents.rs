//! Document upload endpoint.
//!
//! `POST /parse` — receives a PDF as multipart field `pdf`, extracts and
//! classifies its pages, and caches the segmented document for extraction.

use axum::extract::{Multipart, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::AppState;
use crate::models::document::UploadSummary;

/// Multipart field carrying the PDF.
pub const PDF_FIELD: &str = "pdf";

/// `POST /parse` — returns the page and character counts of the new document.
pub async fn parse(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadSummary>, ApiError> {
    let mut pdf_bytes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(PDF_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("document.pdf").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {e}")))?;
        tracing::debug!(file_name, bytes = bytes.len(), "PDF received");
        pdf_bytes = Some(bytes);
    }

    let bytes = pdf_bytes.ok_or_else(|| ApiError::BadRequest("No file provided".into()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty file".into()));
    }

    // Text extraction is CPU-bound.
    let segmenter = state.segmenter.clone();
    let doc = tokio::task::spawn_blocking(move || segmenter.parse_pdf(&bytes)).await??;

    Ok(Json(doc.summary()))
}
