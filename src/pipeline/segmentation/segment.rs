use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::classify::classify_pages;
use super::pdf::PdfTextSource;
use super::SegmentationError;
use crate::cache::KeyedCache;
use crate::models::document::{Page, ParsedDocument, PAGE_SEPARATOR};

/// Build a document from page texts. Pure apart from the timestamp.
///
/// Every page lands in exactly one of `table_text` and `narrative_text`,
/// in page order; `full_text` holds all of them.
pub fn build_document(doc_id: String, page_texts: Vec<String>) -> ParsedDocument {
    let classes = classify_pages(&page_texts);
    let pages: Vec<Page> = page_texts
        .into_iter()
        .zip(classes)
        .enumerate()
        .map(|(i, (text, classification))| Page {
            index: i + 1,
            text,
            classification,
        })
        .collect();

    let full_text = join_labeled(pages.iter());
    let table_text = join_labeled(pages.iter().filter(|p| p.is_table()));
    let narrative_text = join_labeled(pages.iter().filter(|p| !p.is_table()));

    ParsedDocument {
        doc_id,
        pages,
        full_text,
        table_text,
        narrative_text,
        fingerprint: None,
        parsed_at: Utc::now(),
    }
}

fn join_labeled<'a>(pages: impl Iterator<Item = &'a Page>) -> String {
    pages
        .map(Page::labeled)
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

/// Hex SHA-256 of the uploaded file.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Turns uploaded PDFs into cached, segmented documents.
pub struct DocumentSegmenter {
    source: Arc<dyn PdfTextSource>,
    cache: Arc<KeyedCache<ParsedDocument>>,
}

impl DocumentSegmenter {
    pub fn new(source: Arc<dyn PdfTextSource>, cache: Arc<KeyedCache<ParsedDocument>>) -> Self {
        Self { source, cache }
    }

    /// Segment already-extracted pages and store the result under a fresh id.
    pub fn segment(&self, page_texts: Vec<String>) -> Arc<ParsedDocument> {
        let doc = build_document(Uuid::new_v4().to_string(), page_texts);
        self.store(doc)
    }

    /// Extract, classify and cache an uploaded PDF.
    pub fn parse_pdf(&self, pdf_bytes: &[u8]) -> Result<Arc<ParsedDocument>, SegmentationError> {
        let span = tracing::info_span!("parse_document", bytes = pdf_bytes.len());
        let _guard = span.enter();

        let page_texts = self.source.page_texts(pdf_bytes)?;
        if page_texts.is_empty() {
            return Err(SegmentationError::NoPages);
        }
        if page_texts.iter().all(|t| t.trim().is_empty()) {
            return Err(SegmentationError::NoText {
                pages: page_texts.len(),
            });
        }

        let mut doc = build_document(Uuid::new_v4().to_string(), page_texts);
        doc.fingerprint = Some(fingerprint(pdf_bytes));
        Ok(self.store(doc))
    }

    fn store(&self, doc: ParsedDocument) -> Arc<ParsedDocument> {
        let summary = doc.summary();
        tracing::info!(
            doc_id = %summary.doc_id,
            total_pages = summary.total_pages,
            table_pages = summary.table_pages,
            narrative_pages = summary.narrative_pages,
            "Document segmented"
        );
        let doc_id = doc.doc_id.clone();
        let doc = Arc::new(doc);
        self.cache.insert_shared(doc_id, Arc::clone(&doc));
        doc
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::pdf::test_pdf::make_pdf;
    use super::super::pdf::PdfExtractSource;
    use super::*;
    use crate::models::enums::PageClass;

    struct FixedPages(Vec<String>);

    impl PdfTextSource for FixedPages {
        fn page_texts(&self, _: &[u8]) -> Result<Vec<String>, SegmentationError> {
            Ok(self.0.clone())
        }
    }

    fn cache() -> Arc<KeyedCache<ParsedDocument>> {
        Arc::new(KeyedCache::new(8, Duration::from_secs(60)))
    }

    fn assertion_prose() -> String {
        let sentence = "We have prepared the accompanying description of the system for \
                        the period under review, based on the criteria set forth in the \
                        description criteria. ";
        format!("Management's Assertion\n{}", sentence.repeat(5))
    }

    fn sample_pages() -> Vec<String> {
        vec![
            assertion_prose(),
            "The company operates data centers in two regions.".to_string(),
            "1.1 Logical access is restricted. No exceptions noted. CC6.1".to_string(),
        ]
    }

    #[test]
    fn sample_report_classifies_and_partitions() {
        let doc = build_document("d1".into(), sample_pages());
        let classes: Vec<_> = doc.pages.iter().map(|p| p.classification).collect();
        assert_eq!(classes, vec![PageClass::Narrative, PageClass::Table, PageClass::Table]);

        let expected_table = format!(
            "=== PAGE 2 ===\n{}\n\n=== PAGE 3 ===\n{}",
            sample_pages()[1],
            sample_pages()[2]
        );
        assert_eq!(doc.table_text, expected_table);
        assert!(doc.narrative_text.starts_with("=== PAGE 1 ===\nManagement's Assertion"));
    }

    #[test]
    fn every_page_lands_in_exactly_one_partition() {
        let pages = vec![
            "Section I\nIndependent Service Auditor's Report".to_string(),
            "Plain".to_string(),
            "Controls Specified\n2.1 No exceptions noted".to_string(),
            "Plain again".to_string(),
            "Section V\nOther information".to_string(),
        ];
        let doc = build_document("d2".into(), pages);

        for page in &doc.pages {
            let label = format!("=== PAGE {} ===\n", page.index);
            let in_table = doc.table_text.contains(&label);
            let in_narrative = doc.narrative_text.contains(&label);
            assert!(in_table != in_narrative, "page {} in both or neither", page.index);
            assert!(doc.full_text.contains(&label));
        }

        let mut rebuilt: Vec<_> = doc
            .table_pages()
            .chain(doc.narrative_pages())
            .map(|p| p.index)
            .collect();
        rebuilt.sort_unstable();
        assert_eq!(rebuilt, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn full_text_joins_all_pages_in_order() {
        let doc = build_document("d3".into(), vec!["a".into(), "b".into()]);
        assert_eq!(doc.full_text, "=== PAGE 1 ===\na\n\n=== PAGE 2 ===\nb");
        assert!(doc.table_text.is_empty());
    }

    #[test]
    fn segment_stores_under_fresh_id() {
        let cache = cache();
        let segmenter = DocumentSegmenter::new(Arc::new(FixedPages(vec![])), Arc::clone(&cache));

        let a = segmenter.segment(sample_pages());
        let b = segmenter.segment(sample_pages());
        assert_ne!(a.doc_id, b.doc_id);
        assert!(Arc::ptr_eq(&cache.get(&a.doc_id).unwrap(), &a));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn parse_pdf_sets_fingerprint() {
        let segmenter = DocumentSegmenter::new(Arc::new(FixedPages(sample_pages())), cache());
        let doc = segmenter.parse_pdf(b"%PDF-fake").unwrap();
        assert_eq!(doc.fingerprint.as_deref(), Some(fingerprint(b"%PDF-fake").as_str()));
        assert_eq!(doc.summary().table_pages, 2);
    }

    #[test]
    fn parse_pdf_rejects_textless_documents() {
        let segmenter =
            DocumentSegmenter::new(Arc::new(FixedPages(vec![" ".into(), "".into()])), cache());
        let err = segmenter.parse_pdf(b"x").unwrap_err();
        assert!(matches!(err, SegmentationError::NoText { pages: 2 }));

        let segmenter = DocumentSegmenter::new(Arc::new(FixedPages(vec![])), cache());
        assert!(matches!(segmenter.parse_pdf(b"x"), Err(SegmentationError::NoPages)));
    }

    #[test]
    fn parse_real_pdf() {
        let bytes = make_pdf(&["Overview of Operations", "Controls Specified by the Company"]);
        let cache = cache();
        let segmenter = DocumentSegmenter::new(Arc::new(PdfExtractSource), Arc::clone(&cache));

        let doc = segmenter.parse_pdf(&bytes).unwrap();
        assert_eq!(doc.pages.len(), 2);
        assert!(doc.pages[1].text.contains("Controls"));
        assert!(doc.fingerprint.is_some());
        assert!(cache.contains(&doc.doc_id));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = fingerprint(b"abc");
        assert_eq!(fp.len(), 64);
        assert!(fp.starts_with("ba7816bf"));
    }
}
