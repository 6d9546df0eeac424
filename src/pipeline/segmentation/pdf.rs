use std::panic::{catch_unwind, AssertUnwindSafe};

use super::SegmentationError;

/// Source of per-page plain text for an uploaded PDF.
pub trait PdfTextSource: Send + Sync {
    /// One entry per page, in page order.
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, SegmentationError>;
}

/// Text layer extraction using the pdf-extract crate.
/// Scanned PDFs without a text layer yield empty pages.
pub struct PdfExtractSource;

impl PdfTextSource for PdfExtractSource {
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, SegmentationError> {
        // pdf-extract panics on some malformed documents instead of erroring.
        let extracted = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        }))
        .map_err(|panic| {
            let reason = panic_message(panic.as_ref());
            tracing::warn!(bytes = pdf_bytes.len(), reason = %reason, "PDF text extraction panicked");
            SegmentationError::PdfParsing(format!("malformed PDF: {reason}"))
        })?;
        let pages = extracted.map_err(|e| SegmentationError::PdfParsing(e.to_string()))?;
        Ok(pages.into_iter().map(|p| p.trim().to_string()).collect())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::test_pdf::{make_pdf, make_pdf_with_undeclared_font};
    use super::*;

    #[test]
    fn extracts_one_entry_per_page() {
        let bytes = make_pdf(&["Overview of Operations", "Controls Specified by Acme"]);
        let pages = PdfExtractSource.page_texts(&bytes).unwrap();

        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("Overview"), "got: {:?}", pages[0]);
        assert!(pages[1].contains("Controls"), "got: {:?}", pages[1]);
    }

    #[test]
    fn page_text_is_trimmed() {
        let bytes = make_pdf(&["Results of Testing"]);
        let pages = PdfExtractSource.page_texts(&bytes).unwrap();
        assert_eq!(pages[0], pages[0].trim());
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let result = PdfExtractSource.page_texts(b"not a pdf");
        assert!(matches!(result, Err(SegmentationError::PdfParsing(_))));
    }

    #[test]
    fn extractor_panic_becomes_parsing_error() {
        let bytes = make_pdf_with_undeclared_font("Results of Testing");
        let result = PdfExtractSource.page_texts(&bytes);
        assert!(matches!(result, Err(SegmentationError::PdfParsing(_))), "got: {result:?}");
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("bad font");
        assert_eq!(panic_message(payload.as_ref()), "bad font");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bad xref"));
        assert_eq!(panic_message(payload.as_ref()), "bad xref");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown error");
    }
}
