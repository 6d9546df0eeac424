use async_trait::async_trait;

use super::context::PromptContext;
use super::GatewayError;

/// One request to the completion service.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub context: &'a PromptContext,
    pub instruction: &'a str,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// A text-completion service. Implementations classify their own failures
/// into [`GatewayError`] kinds; retry is the gateway's job.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, GatewayError>;
}
