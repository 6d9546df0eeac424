pub mod batch;
pub mod prompts;
pub mod records;
pub mod runner;

pub use batch::*;
pub use runner::*;

use thiserror::Error;

use crate::models::enums::Phase;
use crate::pipeline::gateway::GatewayError;

/// A phase failed after the gateway gave up. The run is abandoned; no
/// partial result is produced.
#[derive(Error, Debug)]
#[error("{phase} phase failed: {source}")]
pub struct OrchestrationError {
    pub phase: Phase,
    pub source: GatewayError,
}
