//! Anthropic Claude API Provider
//!
//! LLM provider using the Messages API. The system preamble travels in the
//! top-level `system` field and the reply is the concatenation of all text
//! content blocks.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{LlmProvider, ProviderConfig, ProviderKind, truncate_body};
use crate::ai::prompt::ContentType;
use crate::ai::request::GenerationRequest;
use crate::ai::retry::{RetryPolicy, run_with_retry};
use crate::constants::network::ANTHROPIC_VERSION;
use crate::types::{DoxError, ErrorClassifier, ProviderError, Result};

const PROVIDER: &str = "claude";

/// Error types Anthropic reports for transient conditions
const RETRYABLE_TYPES: [&str; 1] = ["api_error"];

/// Claude API Provider with secure API key handling
pub struct ClaudeProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    endpoint: String,
    model: String,
    client: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl ClaudeProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let kind = ProviderKind::Claude;
        let api_key = config.require_api_key(kind)?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            endpoint: config.endpoint(kind, "messages")?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| kind.default_model().to_string()),
            client: config.http_client(kind)?,
            retry_policy: RetryPolicy::from(&config.retry).with_predicate(Self::is_retryable),
        })
    }

    /// Replace the retry policy, predicate included
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Base classification plus Anthropic's transient error types
    pub fn is_retryable(err: &DoxError) -> bool {
        if let DoxError::Provider(e) = err
            && e.has_type(&RETRYABLE_TYPES)
        {
            return true;
        }
        ErrorClassifier::is_retryable(err)
    }

    fn build_request(&self, request: &GenerationRequest) -> MessagesRequest {
        MessagesRequest {
            model: request.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: system_preamble(&request.content_type).to_string(),
        }
    }

    async fn send_once(&self, body: &MessagesRequest, attempt: u32) -> Result<String> {
        debug!(attempt, model = %body.model, "Sending request to Claude API");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &text).into());
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&text).map_err(|e| DoxError::ResponseParse {
                provider: PROVIDER.to_string(),
                message: e.to_string(),
            })?;

        if let Some(error) = parsed.error {
            return Err(error.into_provider_error(status.as_u16()).into());
        }

        collect_text(parsed.content).ok_or_else(|| DoxError::EmptyCompletion {
            provider: PROVIDER.to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn generate(
        &self,
        cancel: &CancellationToken,
        request: &GenerationRequest,
    ) -> Result<String> {
        info!(
            model = %request.model,
            content_type = %request.content_type,
            max_tokens = request.max_tokens,
            "Generating with Claude"
        );

        let body = self.build_request(request);
        run_with_retry(cancel, &self.retry_policy, PROVIDER, |attempt| {
            self.send_once(&body, attempt)
        })
        .await
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

fn transport_error(source: reqwest::Error) -> DoxError {
    DoxError::Transport {
        provider: PROVIDER.to_string(),
        source,
    }
}

/// Concatenated text blocks, `None` when the reply holds no text block at all
fn collect_text(blocks: Vec<ContentBlock>) -> Option<String> {
    let mut texts = blocks
        .into_iter()
        .filter(|block| block.block_type == "text")
        .map(|block| block.text.unwrap_or_default())
        .peekable();
    texts.peek()?;
    Some(texts.collect())
}

fn parse_error_body(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope)
            if !envelope.error.message.is_empty() || envelope.error.error_type.is_some() =>
        {
            envelope.error.into_provider_error(status)
        }
        _ => ProviderError::new(PROVIDER, status, truncate_body(body)),
    }
}

fn system_preamble(content_type: &ContentType) -> &'static str {
    match content_type {
        ContentType::Blog => {
            "You are a professional blog writer. Create engaging, well-structured blog posts \
             with clear sections, compelling introductions, and actionable conclusions. \
             Use markdown formatting."
        }
        ContentType::Report => {
            "You are a business analyst. Create professional reports with executive summaries, \
             detailed analysis, and actionable recommendations. Use clear headings."
        }
        ContentType::Summary => {
            "You are an expert at summarization. Create concise, accurate summaries that capture \
             the key points. Focus on the most important information."
        }
        ContentType::Email => {
            "You are a professional email writer. Write clear, concise emails with an \
             appropriate greeting, a clear purpose, well-organized content, and a professional \
             closing."
        }
        ContentType::Proposal => {
            "You are a business proposal expert. Write compelling proposals with an executive \
             summary, a clear value proposition, detailed scope, and timeline."
        }
        ContentType::Code => {
            "You are an expert programmer. Generate clean, well-documented code with proper \
             error handling, clear comments, and attention to performance."
        }
        ContentType::Custom => {
            "You are Claude, a helpful AI assistant. Provide clear, accurate, and helpful \
             responses to the user's request. Be concise but comprehensive."
        }
        ContentType::Other(_) => {
            "You are Claude, a helpful AI assistant. Provide clear, accurate, and helpful \
             responses to the user's request."
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    system: String,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    message: String,
}

impl ApiError {
    fn into_provider_error(self, status: u16) -> ProviderError {
        let err = ProviderError::new(PROVIDER, status, self.message);
        match self.error_type {
            Some(error_type) => err.with_type(error_type),
            None => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrySettings;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProviderConfig {
        let mut config = ProviderConfig::for_kind(ProviderKind::Claude)
            .with_api_key("sk-ant-test")
            .with_base_url(format!("{}/v1", server.uri()));
        config.retry = RetrySettings {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter: true,
        };
        config
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            provider: ProviderKind::Claude,
            model: "claude-3-haiku-20240307".to_string(),
            prompt: "Summarize the memo".to_string(),
            content_type: ContentType::Summary,
            max_tokens: 256,
            temperature: 0.2,
        }
    }

    async fn received(server: &MockServer) -> usize {
        server.received_requests().await.map_or(0, |r| r.len())
    }

    #[tokio::test]
    async fn test_generate_concatenates_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-3-haiku-20240307",
                "system": system_preamble(&ContentType::Summary),
                "messages": [{"role": "user", "content": "Summarize the memo"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "content": [
                    {"type": "text", "text": "Part one. "},
                    {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
                    {"type": "text", "text": "Part two."}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ClaudeProvider::new(&config(&server)).unwrap();
        let text = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap();

        assert_eq!(text, "Part one. Part two.");
    }

    #[tokio::test]
    async fn test_overloaded_is_retried_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let provider = ClaudeProvider::new(&config(&server)).unwrap();
        let err = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap_err();

        // max_retries = 2
        assert_eq!(received(&server).await, 3);
        match err {
            DoxError::Provider(e) => {
                assert_eq!(e.status, 529);
                assert_eq!(e.error_type.as_deref(), Some("overloaded_error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_authentication_error_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let provider = ClaudeProvider::new(&config(&server)).unwrap();
        let err = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap_err();

        assert_eq!(received(&server).await, 1);
        assert_eq!(err.category(), crate::types::ErrorCategory::Auth);
    }

    #[tokio::test]
    async fn test_no_text_blocks_is_empty_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"type": "message", "content": []})),
            )
            .mount(&server)
            .await;

        let provider = ClaudeProvider::new(&config(&server)).unwrap();
        let err = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap_err();

        assert!(matches!(err, DoxError::EmptyCompletion { .. }));
    }

    #[test]
    fn test_collect_text_distinguishes_empty_string() {
        let blocks = vec![ContentBlock {
            block_type: "text".to_string(),
            text: Some(String::new()),
        }];
        assert_eq!(collect_text(blocks), Some(String::new()));
        assert_eq!(collect_text(Vec::new()), None);
    }

    #[test]
    fn test_vendor_retryable_types() {
        let rate_limited: DoxError = ProviderError::new(PROVIDER, 400, "slow down")
            .with_type("rate_limit_error")
            .into();
        assert!(ClaudeProvider::is_retryable(&rate_limited));

        let invalid: DoxError = ProviderError::new(PROVIDER, 400, "bad")
            .with_type("invalid_request_error")
            .into();
        assert!(!ClaudeProvider::is_retryable(&invalid));
    }

    #[test]
    fn test_parse_error_body_keeps_type_without_message() {
        let err = parse_error_body(529, r#"{"error":{"type":"overloaded_error","message":""}}"#);
        assert_eq!(err.error_type.as_deref(), Some("overloaded_error"));
        assert!(err.message.is_empty());
        assert!(ClaudeProvider::is_retryable(&err.into()));
    }

    #[test]
    fn test_parse_error_body_falls_back_to_raw() {
        let err = parse_error_body(503, "Service Unavailable");
        assert_eq!(err.status, 503);
        assert_eq!(err.message, "Service Unavailable");
        assert!(err.error_type.is_none());
    }
}
