//! Report assembly: renders an extraction result into a downloadable file.

pub mod pdf;

pub use pdf::*;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::fallback_report_dir;
use crate::models::result::ExtractionResult;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report rendering failed: {0}")]
    Render(String),

    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A report written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportArtifact {
    pub report_id: String,
    pub path: PathBuf,
    pub file_name: String,
    pub pages: usize,
}

/// Turns a completed extraction into a report artifact.
pub trait ReportAssembler: Send + Sync {
    fn assemble(&self, result: &ExtractionResult) -> Result<ReportArtifact, ReportError>;
}

/// Create the report directory, falling back to a temp-dir location when
/// the configured one cannot be created.
pub fn prepare_report_dir(configured: &Path) -> PathBuf {
    match std::fs::create_dir_all(configured) {
        Ok(()) => configured.to_path_buf(),
        Err(e) => {
            let fallback = fallback_report_dir();
            tracing::warn!(
                configured = %configured.display(),
                fallback = %fallback.display(),
                error = %e,
                "Report directory not creatable, using fallback"
            );
            if let Err(e) = std::fs::create_dir_all(&fallback) {
                tracing::error!(path = %fallback.display(), error = %e, "Fallback report directory not creatable");
            }
            fallback
        }
    }
}

/// Delete the file behind a report that left the store. A file that is
/// already gone is not an error.
pub fn discard_report_file(artifact: &ReportArtifact) {
    match std::fs::remove_file(&artifact.path) {
        Ok(()) => tracing::debug!(
            report_id = %artifact.report_id,
            path = %artifact.path.display(),
            "Report file removed"
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            report_id = %artifact.report_id,
            path = %artifact.path.display(),
            error = %e,
            "Cannot remove report file"
        ),
    }
}
