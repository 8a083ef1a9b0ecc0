//! OpenAI API Provider
//!
//! LLM provider using OpenAI's Chat Completions API. Also works against
//! compatible endpoints via `base_url`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{LlmProvider, ProviderConfig, ProviderKind, truncate_body};
use crate::ai::prompt::ContentType;
use crate::ai::request::GenerationRequest;
use crate::ai::retry::{RetryPolicy, run_with_retry};
use crate::types::{DoxError, ErrorClassifier, ProviderError, Result};

const PROVIDER: &str = "openai";

/// Error types OpenAI reports for transient conditions
const RETRYABLE_TYPES: [&str; 1] = ["server_error"];

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    endpoint: String,
    model: String,
    client: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let kind = ProviderKind::OpenAi;
        let api_key = config.require_api_key(kind)?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            endpoint: config.endpoint(kind, "chat/completions")?,
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

    /// Base classification plus OpenAI's transient error types
    pub fn is_retryable(err: &DoxError) -> bool {
        if let DoxError::Provider(e) = err
            && e.has_type(&RETRYABLE_TYPES)
        {
            return true;
        }
        ErrorClassifier::is_retryable(err)
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_preamble(&request.content_type).to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    async fn send_once(&self, body: &ChatCompletionRequest, attempt: u32) -> Result<String> {
        debug!(attempt, model = %body.model, "Sending request to OpenAI API");

        let response = self
            .client
            .post(&self.endpoint)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &text).into());
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| DoxError::ResponseParse {
                provider: PROVIDER.to_string(),
                message: e.to_string(),
            })?;

        if let Some(error) = parsed.error {
            return Err(error.into_provider_error(status.as_u16()).into());
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| DoxError::EmptyCompletion {
                provider: PROVIDER.to_string(),
            })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(
        &self,
        cancel: &CancellationToken,
        request: &GenerationRequest,
    ) -> Result<String> {
        info!(
            model = %request.model,
            content_type = %request.content_type,
            max_tokens = request.max_tokens,
            "Generating with OpenAI"
        );

        let body = self.build_request(request);
        run_with_retry(cancel, &self.retry_policy, PROVIDER, |attempt| {
            self.send_once(&body, attempt)
        })
        .await
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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

/// Structured error when the body parses, raw status and body otherwise
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
             with clear sections, compelling introductions, and actionable conclusions."
        }
        ContentType::Report => {
            "You are a business analyst. Create professional reports with executive summaries, \
             detailed analysis, clear data presentation, and actionable recommendations."
        }
        ContentType::Summary => {
            "You are an expert at summarization. Create concise, accurate summaries that capture \
             the key points and essential details while staying clear."
        }
        ContentType::Email => {
            "You are a professional email writer. Write clear, concise emails with an \
             appropriate greeting, a clear purpose, and a professional closing."
        }
        ContentType::Proposal => {
            "You are a business proposal expert. Write compelling proposals with an executive \
             summary, a clear value proposition, scope, and timeline."
        }
        ContentType::Code => {
            "You are an expert programmer. Generate clean, well-documented code with proper \
             error handling and clear comments."
        }
        ContentType::Custom | ContentType::Other(_) => {
            "You are a helpful assistant. Provide clear, accurate, and helpful responses to the \
             user's request."
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    /// String in practice, occasionally a number or null
    code: Option<serde_json::Value>,
}

impl ApiError {
    fn into_provider_error(self, status: u16) -> ProviderError {
        let mut err = ProviderError::new(PROVIDER, status, self.message);
        if let Some(error_type) = self.error_type {
            err = err.with_type(error_type);
        }
        match self.code {
            Some(serde_json::Value::String(code)) => err.with_code(code),
            Some(serde_json::Value::Null) | None => err,
            Some(other) => err.with_code(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrySettings;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProviderConfig {
        let mut config = ProviderConfig::for_kind(ProviderKind::OpenAi)
            .with_api_key("sk-test")
            .with_base_url(format!("{}/v1", server.uri()));
        config.retry = RetrySettings {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter: false,
        };
        config
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            provider: ProviderKind::OpenAi,
            model: "gpt-3.5-turbo".to_string(),
            prompt: "Write a haiku".to_string(),
            content_type: ContentType::Blog,
            max_tokens: 100,
            temperature: 0.5,
        }
    }

    fn completion(text: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
        })
    }

    async fn received(server: &MockServer) -> usize {
        server.received_requests().await.map_or(0, |r| r.len())
    }

    #[tokio::test]
    async fn test_generate_success_sends_expected_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 100,
                "messages": [
                    {"role": "system", "content": system_preamble(&ContentType::Blog)},
                    {"role": "user", "content": "Write a haiku"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Autumn leaves")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server)).unwrap();
        let text = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap();

        assert_eq!(text, "Autumn leaves");
    }

    #[tokio::test]
    async fn test_retries_service_unavailable_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream busy"))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("finally")))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server)).unwrap();
        let text = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap();

        assert_eq!(text, "finally");
        assert_eq!(received(&server).await, 4);
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "Invalid 'max_tokens'",
                    "type": "invalid_request_error",
                    "code": null
                }
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server)).unwrap();
        let err = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap_err();

        assert_eq!(received(&server).await, 1);
        match err {
            DoxError::Provider(e) => {
                assert_eq!(e.status, 400);
                assert_eq!(e.message, "Invalid 'max_tokens'");
                assert_eq!(e.error_type.as_deref(), Some("invalid_request_error"));
                assert_eq!(e.code, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unstructured_error_keeps_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server))
            .unwrap()
            .with_retry_policy(RetryPolicy::no_retry());
        let err = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap_err();

        match err {
            DoxError::Provider(e) => {
                assert_eq!(e.status, 502);
                assert_eq!(e.message, "<html>bad gateway</html>");
                assert!(e.error_type.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_distinct_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server)).unwrap();
        let err = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap_err();

        assert!(matches!(err, DoxError::EmptyCompletion { .. }));
        assert_eq!(received(&server).await, 1);
    }

    #[tokio::test]
    async fn test_empty_string_content_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("")))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server)).unwrap();
        let text = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("too late"))
                    .set_delay(Duration::from_secs(20)),
            )
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&config(&server)).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = provider.generate(&cancel, &request()).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let config = ProviderConfig::for_kind(ProviderKind::OpenAi)
            .with_api_key("sk-test")
            .with_base_url("http://127.0.0.1:1/v1");
        let provider = OpenAiProvider::new(&config)
            .unwrap()
            .with_retry_policy(RetryPolicy::no_retry());

        let err = provider
            .generate(&CancellationToken::new(), &request())
            .await
            .unwrap_err();

        assert!(matches!(err, DoxError::Transport { .. }));
        assert!(OpenAiProvider::is_retryable(&err));
    }

    #[test]
    fn test_vendor_retryable_types() {
        let rate_limited: DoxError = ProviderError::new(PROVIDER, 400, "quota")
            .with_code("rate_limit_exceeded")
            .into();
        assert!(OpenAiProvider::is_retryable(&rate_limited));

        let server_error: DoxError = ProviderError::new(PROVIDER, 200, "oops")
            .with_type("server_error")
            .into();
        assert!(OpenAiProvider::is_retryable(&server_error));

        let overloaded: DoxError = ProviderError::new(PROVIDER, 400, "busy")
            .with_type("overloaded_error")
            .into();
        assert!(OpenAiProvider::is_retryable(&overloaded));

        let auth: DoxError = ProviderError::new(PROVIDER, 401, "bad key")
            .with_type("invalid_request_error")
            .into();
        assert!(!OpenAiProvider::is_retryable(&auth));
    }

    #[test]
    fn test_parse_error_body_keeps_type_without_message() {
        let err = parse_error_body(503, r#"{"error":{"type":"server_error","message":""}}"#);
        assert_eq!(err.error_type.as_deref(), Some("server_error"));
        assert!(err.message.is_empty());
        assert!(OpenAiProvider::is_retryable(&err.into()));
    }

    #[test]
    fn test_parse_error_body_numeric_code() {
        let err = parse_error_body(
            429,
            r#"{"error":{"message":"slow down","type":"requests","code":429}}"#,
        );
        assert_eq!(err.code.as_deref(), Some("429"));
        assert_eq!(err.error_type.as_deref(), Some("requests"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ProviderConfig::for_kind(ProviderKind::OpenAi).with_api_key("sk-live-123");
        let provider = OpenAiProvider::new(&config).unwrap();
        assert!(!format!("{:?}", provider).contains("sk-live-123"));
    }
}
