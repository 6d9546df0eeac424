use std::sync::Arc;

use crate::models::document::ParsedDocument;

const SYSTEM_PREAMBLE: &str = "You are an information extraction system specialized in SOC 2 reports.

You will be given specific extraction tasks in the user message. Follow those instructions precisely and return STRICT JSON ONLY with NO CODE FENCES.";

/// Which part of the document a context carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextScope {
    /// Table pages, or the whole document when none were detected.
    Tables,
    /// Narrative pages, or the whole document when every page is a table.
    Narrative,
}

impl ContextScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::Narrative => "narrative",
        }
    }
}

impl std::fmt::Display for ContextScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System text shared by every request of a run.
///
/// Cloning is cheap; the text itself is reference-counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    scope: ContextScope,
    system_text: Arc<str>,
    cacheable: bool,
}

impl PromptContext {
    pub fn new(scope: ContextScope, system_text: impl Into<Arc<str>>, cacheable: bool) -> Self {
        Self {
            scope,
            system_text: system_text.into(),
            cacheable,
        }
    }

    /// Preamble followed by the labelled page text.
    pub fn for_document_text(scope: ContextScope, document_text: &str, cacheable: bool) -> Self {
        let heading = match scope {
            ContextScope::Tables => "Document table content with page markers:",
            ContextScope::Narrative => "Document content with page markers:",
        };
        let text = format!("{SYSTEM_PREAMBLE}\n\n{heading}\n\n{document_text}\n");
        Self::new(scope, text, cacheable)
    }

    pub fn scope(&self) -> ContextScope {
        self.scope
    }

    pub fn system_text(&self) -> &str {
        &self.system_text
    }

    /// Whether the service may cache this context across requests.
    pub fn cacheable(&self) -> bool {
        self.cacheable
    }
}

/// The two contexts of one extraction run.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub doc_id: String,
    pub tables: PromptContext,
    pub narrative: PromptContext,
}

impl DocumentContext {
    pub fn build(doc: &ParsedDocument) -> Self {
        let tables = PromptContext::for_document_text(ContextScope::Tables, doc.table_context_text(), true);
        let narrative =
            PromptContext::for_document_text(ContextScope::Narrative, doc.narrative_context_text(), false);
        tracing::debug!(
            doc_id = %doc.doc_id,
            tables_chars = tables.system_text().len(),
            narrative_chars = narrative.system_text().len(),
            "Prompt contexts built"
        );
        Self {
            doc_id: doc.doc_id.clone(),
            tables,
            narrative,
        }
    }
}
