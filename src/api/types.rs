//! Shared state and response types for the HTTP layer.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::KeyedCache;
use crate::config::AppConfig;
use crate::models::document::ParsedDocument;
use crate::models::result::ExtractionResult;
use crate::pipeline::gateway::{CompletionClient, ModelGateway};
use crate::pipeline::orchestrator::{ExtractionOrchestrator, RunSettings};
use crate::pipeline::segmentation::{DocumentSegmenter, PdfTextSource};
use crate::report::{discard_report_file, ReportArtifact, ReportAssembler};

// ═══════════════════════════════════════════════════════════
// App state, shared by every handler
// ═══════════════════════════════════════════════════════════

/// Cloned into each request. Both stores are bounded by the configured
/// entry count and lifetime; a report leaving its store takes its file
/// with it.
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<KeyedCache<ParsedDocument>>,
    pub reports: Arc<KeyedCache<ReportArtifact>>,
    pub segmenter: Arc<DocumentSegmenter>,
    pub orchestrator: Arc<ExtractionOrchestrator>,
    pub assembler: Arc<dyn ReportAssembler>,
}

impl AppState {
    /// Wire the pipeline from config and the three external seams.
    pub fn new(
        config: &AppConfig,
        pdf_source: Arc<dyn PdfTextSource>,
        client: Arc<dyn CompletionClient>,
        assembler: Arc<dyn ReportAssembler>,
    ) -> Self {
        let documents = Arc::new(KeyedCache::new(config.cache_max_entries, config.cache_ttl));
        let reports = Arc::new(
            KeyedCache::new(config.cache_max_entries, config.cache_ttl)
                .with_eviction_hook(|_, artifact: &ReportArtifact| discard_report_file(artifact)),
        );
        let segmenter = Arc::new(DocumentSegmenter::new(pdf_source, Arc::clone(&documents)));
        let gateway = ModelGateway::from_config(client, config);
        let orchestrator = Arc::new(ExtractionOrchestrator::new(
            Arc::new(gateway),
            RunSettings::from_config(config),
        ));

        Self {
            documents,
            reports,
            segmenter,
            orchestrator,
            assembler,
        }
    }

    /// Drop expired documents and reports. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let purged = self.documents.purge_expired() + self.reports.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "Expired cache entries swept");
        }
        purged
    }
}

// ═══════════════════════════════════════════════════════════
// Responses
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub result: ExtractionResult,
    /// `None` when report generation failed; the result is still returned.
    pub report_id: Option<String>,
    pub elapsed_sec: f64,
}
