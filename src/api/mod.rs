//! HTTP surface: upload a PDF, run an extraction, download the report.
//!
//! Handlers are thin adapters over the segmenter, orchestrator and report
//! assembler held in `AppState`.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_api_server, ApiServer, ServerError};
pub use types::AppState;
