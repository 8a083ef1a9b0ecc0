//! LLM Provider Abstraction
//!
//! Defines the [`LlmProvider`] trait implemented by every vendor client.
//! Clients are interchangeable behind [`SharedProvider`]; adding a vendor
//! means adding a [`ProviderKind`] variant and an implementation.
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible Chat Completions client
//! - `claude`: Anthropic Messages API client

mod claude;
mod openai;

pub use claude::ClaudeProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::request::GenerationRequest;
use super::retry::RetryPolicy;
use crate::config::RetrySettings;
use crate::constants::network;
use crate::types::{DoxError, Result};

// =============================================================================
// Provider Kind
// =============================================================================

/// Supported provider families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Claude,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Claude];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Claude => "claude",
        }
    }

    /// Infer the provider from a model name, defaulting to OpenAI
    pub fn detect_from_model(model: &str) -> Self {
        let lower = model.to_lowercase();
        if lower.contains("claude") {
            return Self::Claude;
        }
        Self::OpenAi
    }

    /// Whether the model name clearly belongs to one provider
    pub fn recognizes_model(model: &str) -> bool {
        let lower = model.to_lowercase();
        ["claude", "gpt", "davinci", "turbo", "o1", "o3"]
            .iter()
            .any(|marker| lower.contains(marker))
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-3.5-turbo",
            Self::Claude => "claude-3-sonnet-20240229",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Claude => "https://api.anthropic.com/v1",
        }
    }

    pub fn default_timeout_secs(&self) -> u64 {
        match self {
            Self::OpenAi => network::OPENAI_TIMEOUT_SECS,
            Self::Claude => network::CLAUDE_TIMEOUT_SECS,
        }
    }

    /// Environment variables consulted for the API key, in order
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Claude => &["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"],
        }
    }

    pub fn available_models(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &[
                "gpt-4-turbo-preview",
                "gpt-4",
                "gpt-3.5-turbo",
                "gpt-3.5-turbo-16k",
            ],
            Self::Claude => &[
                "claude-3-opus-20240229",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
                "claude-2.1",
                "claude-2.0",
                "claude-instant-1.2",
            ],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DoxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "claude" | "anthropic" => Ok(Self::Claude),
            other => Err(DoxError::Config(format!(
                "Unknown provider: {}. Supported: openai, claude",
                other
            ))),
        }
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for one provider client
///
/// Note: API keys are never serialized to output and are redacted in debug
/// output. Each client converts the key to SecretString internally.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key, never serialized to output
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for proxies and compatible endpoints)
    pub base_url: Option<String>,
    /// Default model when a request does not name one
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub retry: RetrySettings,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            timeout_secs: network::OPENAI_TIMEOUT_SECS,
            retry: RetrySettings::default(),
        }
    }
}

impl ProviderConfig {
    /// Defaults for a provider family
    pub fn for_kind(kind: ProviderKind) -> Self {
        Self {
            model: Some(kind.default_model().to_string()),
            timeout_secs: kind.default_timeout_secs(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// API key, rejecting missing or blank values
    fn require_api_key(&self, kind: ProviderKind) -> Result<String> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(DoxError::Config(format!(
                "{} API key not found. Set {} or provide it in config",
                kind,
                kind.api_key_vars().join(" / ")
            ))),
        }
    }

    /// Full endpoint URL for `path` under the configured or default base
    fn endpoint(&self, kind: ProviderKind, path: &str) -> Result<String> {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| kind.default_base_url());
        let parsed = url::Url::parse(base)
            .map_err(|e| DoxError::Config(format!("Invalid {} base URL '{}': {}", kind, base, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DoxError::Config(format!(
                "Invalid {} base URL '{}': scheme must be http or https",
                kind, base
            )));
        }
        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    }

    fn http_client(&self, kind: ProviderKind) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| DoxError::Config(format!("Failed to create {} HTTP client: {}", kind, e)))
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Vendor client turning a [`GenerationRequest`] into generated text
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate text, retrying transient failures with the client's policy.
    ///
    /// Cancelling `cancel` aborts both an in-flight HTTP call and a pending
    /// backoff wait.
    async fn generate(&self, cancel: &CancellationToken, request: &GenerationRequest)
    -> Result<String>;

    fn kind(&self) -> ProviderKind;

    /// Provider name for logging
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Model used when a request does not name one
    fn default_model(&self) -> &str;

    fn retry_policy(&self) -> &RetryPolicy;
}

/// Shared provider type for concurrent access
pub type SharedProvider = Arc<dyn LlmProvider>;

/// Create a shared provider from configuration
pub fn create_provider(kind: ProviderKind, config: &ProviderConfig) -> Result<SharedProvider> {
    match kind {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiProvider::new(config)?)),
        ProviderKind::Claude => Ok(Arc::new(ClaudeProvider::new(config)?)),
    }
}

/// Truncate an unparseable error body before it lands in an error message
fn truncate_body(body: &str) -> String {
    let limit = network::MAX_ERROR_BODY_CHARS;
    match body.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_from_model() {
        assert_eq!(
            ProviderKind::detect_from_model("claude-3-opus-20240229"),
            ProviderKind::Claude
        );
        assert_eq!(
            ProviderKind::detect_from_model("Claude-Instant"),
            ProviderKind::Claude
        );
        assert_eq!(ProviderKind::detect_from_model("gpt-4"), ProviderKind::OpenAi);
        assert_eq!(
            ProviderKind::detect_from_model("text-davinci-003"),
            ProviderKind::OpenAi
        );
        assert_eq!(
            ProviderKind::detect_from_model("mystery-model"),
            ProviderKind::OpenAi
        );
        assert!(!ProviderKind::recognizes_model("mystery-model"));
        assert!(ProviderKind::recognizes_model("gpt-3.5-turbo"));
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(
            "anthropic".parse::<ProviderKind>().unwrap(),
            ProviderKind::Claude
        );
        assert!("ollama".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::OpenAi).unwrap(),
            "\"openai\""
        );
        assert_eq!(
            serde_json::from_str::<ProviderKind>("\"claude\"").unwrap(),
            ProviderKind::Claude
        );
    }

    #[test]
    fn test_provider_config_redacts_key() {
        let config = ProviderConfig::for_kind(ProviderKind::OpenAi).with_api_key("sk-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = ProviderConfig::for_kind(ProviderKind::Claude).with_api_key("   ");
        assert!(matches!(
            create_provider(ProviderKind::Claude, &config),
            Err(DoxError::Config(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = ProviderConfig::default().with_base_url("http://localhost:8080/v1/");
        assert_eq!(
            config.endpoint(ProviderKind::OpenAi, "chat/completions").unwrap(),
            "http://localhost:8080/v1/chat/completions"
        );

        let config = ProviderConfig::default().with_base_url("not a url");
        assert!(config.endpoint(ProviderKind::OpenAi, "chat/completions").is_err());
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(network::MAX_ERROR_BODY_CHARS + 10);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncated.chars().count(), network::MAX_ERROR_BODY_CHARS + 1);
        assert_eq!(truncate_body("short"), "short");
    }
}
