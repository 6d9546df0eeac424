//! Bedrock runtime client speaking the Anthropic messages format.

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::config::{Credentials, Region};
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_bedrockruntime::operation::invoke_model::InvokeModelError;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use serde::Deserialize;
use serde_json::json;

use super::client::{CompletionClient, CompletionRequest};
use super::GatewayError;
use crate::config::AppConfig;

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const CREDENTIALS_PROVIDER: &str = "soc2-extract-env";

pub struct BedrockClient {
    client: Client,
    model_id: String,
}

impl BedrockClient {
    /// Build from config. SDK-level retries are disabled; the gateway's
    /// retry policy is the only one applied.
    pub async fn from_config(config: &AppConfig) -> Self {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(timeouts)
            .retry_config(RetryConfig::disabled());

        if let Some(creds) = &config.credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }

        let sdk_config = loader.load().await;
        tracing::info!(
            region = %config.region,
            model_id = %config.model_id,
            explicit_credentials = config.credentials.is_some(),
            "Bedrock client configured"
        );

        Self {
            client: Client::new(&sdk_config),
            model_id: config.model_id.clone(),
        }
    }
}

#[async_trait]
impl CompletionClient for BedrockClient {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, GatewayError> {
        let body = serde_json::to_vec(&build_request_body(request))
            .map_err(|e| GatewayError::Fatal(format!("request encoding failed: {e}")))?;

        let output = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(classify_sdk_error)?;

        extract_text(output.body().as_ref())
    }
}

// ═══════════════════════════════════════════════════════════
// Wire format
// ═══════════════════════════════════════════════════════════

pub(crate) fn build_request_body(request: &CompletionRequest<'_>) -> serde_json::Value {
    let mut system_block = json!({
        "type": "text",
        "text": request.context.system_text(),
    });
    if request.context.cacheable() {
        system_block["cache_control"] = json!({ "type": "ephemeral" });
    }

    json!({
        "anthropic_version": ANTHROPIC_VERSION,
        "max_tokens": request.max_output_tokens,
        "temperature": request.temperature,
        "system": [system_block],
        "messages": [{
            "role": "user",
            "content": [{ "type": "text", "text": request.instruction }],
        }],
    })
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Join the text blocks of a messages response.
pub(crate) fn extract_text(body: &[u8]) -> Result<String, GatewayError> {
    let raw = String::from_utf8_lossy(body);
    let response: MessagesResponse = serde_json::from_slice(body)
        .map_err(|e| GatewayError::malformed(format!("unreadable service envelope: {e}"), &*raw))?;

    if response.stop_reason.as_deref() == Some("max_tokens") {
        tracing::warn!("Model response hit the output token limit");
    }

    let text: String = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text.as_str())
        .collect();
    if text.trim().is_empty() {
        return Err(GatewayError::malformed("response has no text content", &*raw));
    }
    Ok(text)
}

// ═══════════════════════════════════════════════════════════
// Error classification
// ═══════════════════════════════════════════════════════════

fn classify_sdk_error<R>(err: SdkError<InvokeModelError, R>) -> GatewayError
where
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            GatewayError::Transient(message)
        }
        SdkError::ServiceError(service) => classify_service_code(service.err().code(), message),
        _ => GatewayError::Fatal(message),
    }
}

/// Map a service error code to a gateway error kind.
pub(crate) fn classify_service_code(code: Option<&str>, message: String) -> GatewayError {
    match code {
        Some("ThrottlingException" | "ServiceQuotaExceededException" | "TooManyRequestsException") => {
            GatewayError::RateLimited(message)
        }
        Some(
            "ModelTimeoutException"
            | "InternalServerException"
            | "ServiceUnavailableException"
            | "ModelNotReadyException",
        ) => GatewayError::Transient(message),
        _ => GatewayError::Fatal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::gateway::{ContextScope, GatewayErrorKind, PromptContext};

    fn request<'a>(context: &'a PromptContext, instruction: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            context,
            instruction,
            max_output_tokens: 10_000,
            temperature: 0.0,
        }
    }

    #[test]
    fn cacheable_context_marks_system_block() {
        let ctx = PromptContext::new(ContextScope::Tables, "tables", true);
        let body = build_request_body(&request(&ctx, "extract"));

        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(body["max_tokens"], 10_000);
        assert_eq!(body["system"][0]["text"], "tables");
        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["text"], "extract");
    }

    #[test]
    fn non_cacheable_context_has_no_cache_control() {
        let ctx = PromptContext::new(ContextScope::Narrative, "narrative", false);
        let body = build_request_body(&request(&ctx, "opinion"));
        assert!(body["system"][0].get("cache_control").is_none());
    }

    #[test]
    fn text_blocks_are_joined() {
        let body = br#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"text","text":"1}"}],"stop_reason":"end_turn"}"#;
        assert_eq!(extract_text(body).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn non_text_blocks_are_skipped() {
        let body = br#"{"content":[{"type":"tool_use","id":"x"},{"type":"text","text":"{}"}]}"#;
        assert_eq!(extract_text(body).unwrap(), "{}");
    }

    #[test]
    fn empty_content_is_malformed() {
        let err = extract_text(br#"{"content":[]}"#).unwrap_err();
        assert_eq!(err.kind(), GatewayErrorKind::Malformed);
    }

    #[test]
    fn unreadable_envelope_is_malformed() {
        let err = extract_text(b"<html>bad gateway</html>").unwrap_err();
        match err {
            GatewayError::Malformed { raw, .. } => assert!(raw.contains("bad gateway")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn service_codes_map_to_kinds() {
        let kind = |code| classify_service_code(code, "m".into()).kind();
        assert_eq!(kind(Some("ThrottlingException")), GatewayErrorKind::RateLimited);
        assert_eq!(kind(Some("ServiceQuotaExceededException")), GatewayErrorKind::RateLimited);
        assert_eq!(kind(Some("ModelTimeoutException")), GatewayErrorKind::Transient);
        assert_eq!(kind(Some("InternalServerException")), GatewayErrorKind::Transient);
        assert_eq!(kind(Some("ServiceUnavailableException")), GatewayErrorKind::Transient);
        assert_eq!(kind(Some("AccessDeniedException")), GatewayErrorKind::Fatal);
        assert_eq!(kind(Some("ValidationException")), GatewayErrorKind::Fatal);
        assert_eq!(kind(None), GatewayErrorKind::Fatal);
    }
}
