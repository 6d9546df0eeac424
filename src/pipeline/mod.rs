pub mod gateway; // Model calls with retry and strict JSON parsing
pub mod merge; // Criteria reconciliation
pub mod orchestrator; // Phased, cursor-batched extraction
pub mod segmentation; // PDF text, page classification, context partitions
