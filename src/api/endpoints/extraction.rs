//! Extraction endpoint.
//!
//! `POST /extract/:doc_id` — runs every extraction phase against a cached
//! document and renders the report.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{AppState, ExtractResponse};

pub async fn extract(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let doc = state
        .documents
        .get(&doc_id)
        .ok_or_else(|| ApiError::DocumentNotFound(doc_id.clone()))?;

    let started = Instant::now();
    let result = state.orchestrator.run(&doc).await?;

    // A failed report never fails the request.
    let assembler = state.assembler.clone();
    let for_report = result.clone();
    let report_id = match tokio::task::spawn_blocking(move || assembler.assemble(&for_report)).await {
        Ok(Ok(artifact)) => {
            let report_id = artifact.report_id.clone();
            state.reports.insert(report_id.clone(), artifact);
            Some(report_id)
        }
        Ok(Err(e)) => {
            tracing::error!(doc_id = %doc_id, error = %e, "Report generation failed");
            None
        }
        Err(e) => {
            tracing::error!(doc_id = %doc_id, error = %e, "Report task failed");
            None
        }
    };

    let elapsed_sec = started.elapsed().as_secs_f64();
    tracing::info!(
        doc_id = %doc_id,
        elapsed_sec,
        report = report_id.is_some(),
        "Extraction request complete"
    );

    Ok(Json(ExtractResponse {
        result,
        report_id,
        elapsed_sec,
    }))
}
