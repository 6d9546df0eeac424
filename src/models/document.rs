use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::PageClass;

/// One classified page of the source PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub index: usize,
    pub text: String,
    pub classification: PageClass,
}

impl Page {
    /// Page text prefixed with its `=== PAGE n ===` marker.
    pub fn labeled(&self) -> String {
        page_label(self.index, &self.text)
    }

    pub fn is_table(&self) -> bool {
        self.classification == PageClass::Table
    }
}

/// Marker line used in every concatenated text blob.
pub fn page_label(index: usize, text: &str) -> String {
    format!("=== PAGE {index} ===\n{text}")
}

/// Separator between labeled pages in concatenated text.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// A segmented document, ready for extraction.
///
/// `table_text` and `narrative_text` partition `full_text` by page
/// classification; page order is preserved within each partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub doc_id: String,
    pub pages: Vec<Page>,
    pub full_text: String,
    pub table_text: String,
    pub narrative_text: String,
    /// SHA-256 of the uploaded bytes, when the document came from a file.
    pub fingerprint: Option<String>,
    pub parsed_at: DateTime<Utc>,
}

impl ParsedDocument {
    pub fn table_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(|p| p.is_table())
    }

    pub fn narrative_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(|p| !p.is_table())
    }

    /// Text used for control/table phases. Falls back to the full text when
    /// no page was classified as a table.
    pub fn table_context_text(&self) -> &str {
        if self.table_text.trim().is_empty() {
            &self.full_text
        } else {
            &self.table_text
        }
    }

    /// Text used for the auditor-opinion phase. Falls back to the full text
    /// when every page was classified as a table.
    pub fn narrative_context_text(&self) -> &str {
        if self.narrative_text.trim().is_empty() {
            &self.full_text
        } else {
            &self.narrative_text
        }
    }

    pub fn summary(&self) -> UploadSummary {
        UploadSummary {
            doc_id: self.doc_id.clone(),
            total_pages: self.pages.len(),
            table_pages: self.table_pages().count(),
            narrative_pages: self.narrative_pages().count(),
            full_chars: self.full_text.chars().count(),
            table_chars: self.table_text.chars().count(),
        }
    }
}

/// Response body of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub doc_id: String,
    pub total_pages: usize,
    pub table_pages: usize,
    pub narrative_pages: usize,
    pub full_chars: usize,
    pub table_chars: usize,
}
