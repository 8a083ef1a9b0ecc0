//! Content Generator
//!
//! Orchestrates one generation call:
//!
//! ```text
//! validate → detect provider → cache lookup ─ hit ──────────────→ done
//!                                          └─ miss → dispatch → store → done
//! ```
//!
//! ## Features
//! - **Lazy providers**: clients are built on first use per [`ProviderKind`]
//!   and shared across concurrent calls via `DashMap`
//! - **Response cache**: optional [`ResponseCache`], switchable at runtime
//! - **Cancellation**: the caller's token reaches every provider attempt and
//!   backoff wait

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::cache::{CacheConfig, CacheStatistics, ResponseCache};
use super::prompt::{ContentType, enhance_prompt};
use super::provider::{ProviderConfig, ProviderKind, SharedProvider, create_provider};
use super::request::{GenerationRequest, GenerationResult};
use crate::config::{Config, GenerateConfig};
use crate::constants::{cache as cache_constants, generate};
use crate::types::{DoxError, Result, ValidationErrorKind};

// =============================================================================
// Configuration
// =============================================================================

/// Everything a [`Generator`] needs, resolved up front
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub openai: ProviderConfig,
    pub claude: ProviderConfig,
    /// Provider used when neither the options nor the model name pick one
    pub default_provider: ProviderKind,
    /// Response cache, `None` to start without one
    pub cache: Option<CacheConfig>,
    /// Calls kept in flight by [`Generator::generate_batch`]
    pub batch_concurrency: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for GeneratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            openai: config.openai.clone(),
            claude: config.claude.clone(),
            default_provider: config.default_provider(),
            cache: config
                .cache
                .enabled
                .then(|| CacheConfig::from(&config.cache)),
            batch_concurrency: generate::DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl GeneratorConfig {
    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Claude => &self.claude,
        }
    }

    pub fn with_cache(mut self, cache: Option<CacheConfig>) -> Self {
        self.cache = cache;
        self
    }

    /// Model used for `kind` when a call does not name one
    pub fn model_for(&self, kind: ProviderKind) -> String {
        self.provider(kind)
            .model
            .clone()
            .unwrap_or_else(|| kind.default_model().to_string())
    }

    /// Provider chosen for `options`: explicit, then model name, then default
    pub fn resolve_provider(&self, options: &GenerateOptions) -> ProviderKind {
        if let Some(kind) = options.provider {
            return kind;
        }
        match options.model.as_deref() {
            Some(model) if ProviderKind::recognizes_model(model) => {
                ProviderKind::detect_from_model(model)
            }
            _ => self.default_provider,
        }
    }
}

/// Per-call generation options
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub content_type: ContentType,
    /// Model override; the provider's configured model when unset
    pub model: Option<String>,
    /// Explicit provider; inferred from the model when unset
    pub provider: Option<ProviderKind>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Prepend content-type instructions to the prompt
    pub enhance: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            content_type: ContentType::default(),
            model: None,
            provider: None,
            max_tokens: generate::DEFAULT_MAX_TOKENS,
            temperature: generate::DEFAULT_TEMPERATURE,
            enhance: true,
        }
    }
}

impl From<&GenerateConfig> for GenerateOptions {
    fn from(config: &GenerateConfig) -> Self {
        Self {
            content_type: ContentType::from(config.content_type.as_str()),
            model: config.model.clone(),
            provider: config.provider.as_deref().and_then(|p| p.parse().ok()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            enhance: config.enhance_prompt,
        }
    }
}

impl GenerateOptions {
    fn validate(&self) -> Result<()> {
        if !(self.temperature.is_finite() && (0.0..=1.0).contains(&self.temperature)) {
            return Err(DoxError::validation(
                ValidationErrorKind::Range,
                "temperature",
                format!("must be between 0.0 and 1.0, got {}", self.temperature),
            ));
        }
        if self.max_tokens == 0 {
            return Err(DoxError::validation(
                ValidationErrorKind::Range,
                "max_tokens",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Results
// =============================================================================

/// What the cache did for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// No cache is enabled
    Disabled,
    /// Answered from the cache without contacting the provider
    Hit,
    /// Fresh result stored in the cache
    Stored,
    /// Fresh result could not be stored; the result is still valid
    StoreFailed,
}

/// Result of [`Generator::generate_detailed`]
#[derive(Debug, Clone)]
pub struct Generation {
    pub result: GenerationResult,
    pub cache_status: CacheStatus,
}

// =============================================================================
// Generator
// =============================================================================

/// Provider-agnostic content generator
///
/// `Send + Sync`; share it behind an `Arc` for concurrent callers.
pub struct Generator {
    config: GeneratorConfig,
    providers: DashMap<ProviderKind, SharedProvider>,
    cache: RwLock<Option<Arc<ResponseCache>>>,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        let cache = config.cache.clone().map(|c| Arc::new(ResponseCache::new(c)));
        Self {
            config,
            providers: DashMap::new(),
            cache: RwLock::new(cache),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Use `provider` for its kind instead of building one from config
    pub fn with_provider(self, provider: SharedProvider) -> Self {
        self.register_provider(provider);
        self
    }

    pub fn register_provider(&self, provider: SharedProvider) {
        self.providers.insert(provider.kind(), provider);
    }

    // -------------------------------------------------------------------------
    // Cache control
    // -------------------------------------------------------------------------

    /// Replace the cache with a fresh one
    pub fn enable_cache(&self, ttl: Duration, max_entries: usize) {
        self.enable_cache_with(CacheConfig {
            ttl,
            max_entries,
            max_bytes: cache_constants::GENERATOR_MAX_BYTES,
            sweep_interval: Some(Duration::from_secs(cache_constants::SWEEP_INTERVAL_SECS)),
        });
    }

    pub fn enable_cache_with(&self, config: CacheConfig) {
        debug!(?config, "Enabling response cache");
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) =
            Some(Arc::new(ResponseCache::new(config)));
    }

    /// Drop the cache and everything in it
    pub fn disable_cache(&self) {
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Statistics of the current cache, `None` when disabled
    pub fn cache_statistics(&self) -> Option<CacheStatistics> {
        self.current_cache().map(|cache| cache.stats())
    }

    fn current_cache(&self) -> Option<Arc<ResponseCache>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // -------------------------------------------------------------------------
    // Generation
    // -------------------------------------------------------------------------

    /// Generate text for `prompt`
    ///
    /// A prompt starting with `@` names a file whose contents are used.
    pub async fn generate(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String> {
        Ok(self
            .generate_detailed(cancel, prompt, options)
            .await?
            .result
            .text)
    }

    /// Like [`generate`](Self::generate), also reporting what the cache did
    #[instrument(
        skip(self, cancel, prompt, options),
        fields(request_id = %Uuid::new_v4(), content_type = %options.content_type)
    )]
    pub async fn generate_detailed(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation> {
        let prompt = resolve_prompt(prompt).await?;
        options.validate()?;

        let request = self.build_request(prompt, options);
        let cache = self.current_cache();

        if let Some(cache) = &cache
            && let Some(result) = cache.get(&request)
        {
            debug!(provider = %request.provider, model = %request.model, "Cache hit");
            return Ok(Generation {
                result,
                cache_status: CacheStatus::Hit,
            });
        }

        let provider = self.provider(request.provider)?;
        info!(
            provider = provider.name(),
            model = %request.model,
            max_tokens = request.max_tokens,
            "Dispatching generation"
        );

        let text = provider.generate(cancel, &request).await?;
        let result = GenerationResult::new(text, request.provider, request.model.clone());

        let cache_status = match &cache {
            None => CacheStatus::Disabled,
            Some(cache) => match cache.set(&request, result.clone()) {
                Ok(()) => CacheStatus::Stored,
                Err(e) => {
                    warn!(error = %e, "Failed to cache response");
                    CacheStatus::StoreFailed
                }
            },
        };

        Ok(Generation {
            result,
            cache_status,
        })
    }

    /// Generate for several prompts with at most `batch_concurrency` calls in
    /// flight. Results keep the order of `prompts`.
    pub async fn generate_batch(
        &self,
        cancel: &CancellationToken,
        prompts: Vec<String>,
        options: &GenerateOptions,
    ) -> Vec<Result<String>> {
        stream::iter(prompts)
            .map(move |prompt| async move { self.generate(cancel, &prompt, options).await })
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await
    }

    pub fn detect_provider(&self, options: &GenerateOptions) -> ProviderKind {
        self.config.resolve_provider(options)
    }

    fn build_request(&self, prompt: String, options: &GenerateOptions) -> GenerationRequest {
        let provider = self.detect_provider(options);
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.model_for(provider));
        let prompt = if options.enhance {
            enhance_prompt(&prompt, &options.content_type)
        } else {
            prompt
        };

        GenerationRequest {
            provider,
            model,
            prompt,
            content_type: options.content_type.clone(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        }
    }

    fn provider(&self, kind: ProviderKind) -> Result<SharedProvider> {
        let entry = self
            .providers
            .entry(kind)
            .or_try_insert_with(|| create_provider(kind, self.config.provider(kind)))?;
        Ok(Arc::clone(entry.value()))
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("config", &self.config)
            .field("providers", &self.providers.len())
            .field("cache", &self.current_cache())
            .finish()
    }
}

/// Validate a prompt and expand `@path` references
pub async fn resolve_prompt(prompt: &str) -> Result<String> {
    if prompt.trim().is_empty() {
        return Err(DoxError::validation(
            ValidationErrorKind::MissingField,
            "prompt",
            "prompt cannot be empty",
        ));
    }

    let Some(path) = prompt.strip_prefix('@') else {
        return Ok(prompt.to_string());
    };

    let path = PathBuf::from(path.trim());
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| DoxError::PromptFile {
            path: path.clone(),
            source,
        })?;

    if content.trim().is_empty() {
        return Err(DoxError::validation(
            ValidationErrorKind::MissingField,
            "prompt",
            format!("prompt file {} is empty", path.display()),
        ));
    }
    Ok(content)
}
