//! Gateway to the external completion service.
//!
//! One [`DocumentContext`] is built per run and reused by reference for
//! every request. Transient and rate-limit failures are retried according
//! to a [`RetryPolicy`]; malformed and fatal failures surface at once.

pub mod bedrock;
pub mod client;
pub mod context;
pub mod parser;
pub mod retry;

#[cfg(test)]
pub mod mock;

pub use client::*;
pub use context::*;
pub use parser::*;
pub use retry::*;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("transient model service failure: {0}")]
    Transient(String),

    #[error("model service rate limited: {0}")]
    RateLimited(String),

    #[error("malformed model response: {reason} (response: {})", truncate_for_log(.raw, MALFORMED_DISPLAY_CHARS))]
    Malformed { reason: String, raw: String },

    #[error("model service call failed: {0}")]
    Fatal(String),
}

/// Raw response characters shown when a malformed error is displayed.
const MALFORMED_DISPLAY_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    Transient,
    RateLimited,
    Malformed,
    Fatal,
}

impl GatewayErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate_limited",
            Self::Malformed => "malformed",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            Self::Transient(_) => GatewayErrorKind::Transient,
            Self::RateLimited(_) => GatewayErrorKind::RateLimited,
            Self::Malformed { .. } => GatewayErrorKind::Malformed,
            Self::Fatal(_) => GatewayErrorKind::Fatal,
        }
    }

    /// Only transient and rate-limit failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited(_))
    }

    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════

/// Per-request generation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl GenerationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// How raw model responses are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseLogging {
    pub enabled: bool,
    /// 0 logs the whole response.
    pub max_chars: usize,
}

impl ResponseLogging {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enabled: config.log_model_full,
            max_chars: config.log_model_max_chars,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_chars: 0,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// ModelGateway
// ═══════════════════════════════════════════════════════════

/// Issues extraction requests against a prompt context with retry.
pub struct ModelGateway {
    client: Arc<dyn CompletionClient>,
    policy: RetryPolicy,
    settings: GenerationSettings,
    logging: ResponseLogging,
}

impl ModelGateway {
    pub fn new(client: Arc<dyn CompletionClient>, policy: RetryPolicy, settings: GenerationSettings) -> Self {
        Self {
            client,
            policy,
            settings,
            logging: ResponseLogging::disabled(),
        }
    }

    pub fn from_config(client: Arc<dyn CompletionClient>, config: &AppConfig) -> Self {
        Self::new(
            client,
            RetryPolicy::from_config(config),
            GenerationSettings::from_config(config),
        )
        .with_response_logging(ResponseLogging::from_config(config))
    }

    pub fn with_response_logging(mut self, logging: ResponseLogging) -> Self {
        self.logging = logging;
        self
    }

    /// Send one instruction against `context`, retrying retryable failures
    /// with backoff. Returns the raw response text.
    pub async fn invoke_with_retry(
        &self,
        context: &PromptContext,
        instruction: &str,
    ) -> Result<String, GatewayError> {
        let request = CompletionRequest {
            context,
            instruction,
            max_output_tokens: self.settings.max_output_tokens,
            temperature: self.settings.temperature,
        };

        let mut attempt: u32 = 1;
        loop {
            match self.client.complete(&request).await {
                Ok(text) => {
                    if self.logging.enabled {
                        tracing::debug!(
                            scope = %context.scope(),
                            attempt,
                            chars = text.chars().count(),
                            response = %truncate_for_log(&text, self.logging.max_chars),
                            "Model response"
                        );
                    }
                    return Ok(text);
                }
                Err(e) if self.policy.should_retry(&e, attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        kind = %e.kind(),
                        error = %e,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(attempts = attempt, kind = %e.kind(), "Model call retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Like [`invoke_with_retry`](Self::invoke_with_retry), then parse the
    /// response strictly as `T`. Parse failures are not retried.
    pub async fn invoke_json<T: DeserializeOwned>(
        &self,
        context: &PromptContext,
        instruction: &str,
    ) -> Result<T, GatewayError> {
        let raw = self.invoke_with_retry(context, instruction).await?;
        parse_strict(&raw)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
