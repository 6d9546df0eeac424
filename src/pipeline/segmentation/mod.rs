pub mod classify;
pub mod pdf;
pub mod sections;
pub mod segment;

pub use classify::*;
pub use pdf::*;
pub use segment::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF has no pages")]
    NoPages,

    #[error("PDF has no extractable text layer ({pages} pages)")]
    NoText { pages: usize },
}
