//! Scripted completion client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{CompletionClient, CompletionRequest};
use super::context::ContextScope;
use super::GatewayError;

/// What the client saw for one call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub scope: ContextScope,
    pub instruction: String,
    pub max_output_tokens: u32,
}

/// Replies with scripted results in order. Once the script runs out, every
/// further call fails fatally.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<String, GatewayError>>>,
    fallback: Result<String, GatewayError>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Err(GatewayError::Fatal("script exhausted".into())),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, GatewayError> {
        self.seen.lock().unwrap().push(SeenRequest {
            scope: request.context.scope(),
            instruction: request.instruction.to_string(),
            max_output_tokens: request.max_output_tokens,
        });
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
