//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/dox/) and project (.dox/) level configuration.

use serde::{Deserialize, Serialize};

use crate::ai::prompt::ContentType;
use crate::ai::provider::{ProviderConfig, ProviderKind};
use crate::constants::{cache, generate, retry};
use crate::types::{DoxError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Defaults applied to every generation request
    pub generate: GenerateConfig,

    /// OpenAI-compatible provider settings
    pub openai: ProviderConfig,

    /// Claude provider settings
    pub claude: ProviderConfig,

    /// Response cache settings
    pub cache: CacheSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            generate: GenerateConfig::default(),
            openai: ProviderConfig::for_kind(ProviderKind::OpenAi),
            claude: ProviderConfig::for_kind(ProviderKind::Claude),
            cache: CacheSettings::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `DoxError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.generate.temperature) {
            return Err(DoxError::Config(format!(
                "generate.temperature must be between 0.0 and 1.0, got {}",
                self.generate.temperature
            )));
        }

        if self.generate.max_tokens == 0 {
            return Err(DoxError::Config(
                "generate.max_tokens must be greater than 0".to_string(),
            ));
        }

        if !ContentType::from(self.generate.content_type.as_str()).is_known() {
            return Err(DoxError::Config(format!(
                "generate.content_type '{}' is not one of: {}",
                self.generate.content_type,
                ContentType::KNOWN_TAGS.join(", ")
            )));
        }

        if let Some(provider) = &self.generate.provider {
            provider.parse::<ProviderKind>()?;
        }

        for (section, provider) in [("openai", &self.openai), ("claude", &self.claude)] {
            if provider.timeout_secs == 0 {
                return Err(DoxError::Config(format!(
                    "{}.timeout_secs must be greater than 0",
                    section
                )));
            }
            provider.retry.validate(section)?;
        }

        if self.cache.enabled {
            if self.cache.max_entries == 0 {
                return Err(DoxError::Config(
                    "cache.max_entries must be greater than 0".to_string(),
                ));
            }
            if self.cache.ttl_secs == 0 {
                return Err(DoxError::Config(
                    "cache.ttl_secs must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Settings for one provider
    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Claude => &self.claude,
        }
    }

    pub fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Claude => &mut self.claude,
        }
    }

    /// Default provider for requests whose model does not name one
    pub fn default_provider(&self) -> ProviderKind {
        self.generate
            .provider
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or_default()
    }
}

/// Generation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// Content type tag (blog, report, summary, email, proposal, code, custom)
    pub content_type: String,
    /// Preferred provider when the model does not imply one
    pub provider: Option<String>,
    /// Model override; provider default when unset
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Prepend content-type instructions to prompts
    pub enhance_prompt: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            content_type: "custom".to_string(),
            provider: None,
            model: None,
            max_tokens: generate::DEFAULT_MAX_TOKENS,
            temperature: generate::DEFAULT_TEMPERATURE,
            enhance_prompt: true,
        }
    }
}

/// Retry tunables for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: retry::DEFAULT_MAX_RETRIES,
            initial_delay_ms: retry::INITIAL_DELAY_MS,
            max_delay_ms: retry::PROVIDER_MAX_DELAY_MS,
            multiplier: retry::BACKOFF_FACTOR,
            jitter: true,
        }
    }
}

impl RetrySettings {
    fn validate(&self, section: &str) -> Result<()> {
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(DoxError::Config(format!(
                "{}.retry.multiplier must be at least 1.0, got {}",
                section, self.multiplier
            )));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(DoxError::Config(format!(
                "{}.retry.max_delay_ms ({}) is below initial_delay_ms ({})",
                section, self.max_delay_ms, self.initial_delay_ms
            )));
        }
        Ok(())
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// Byte ceiling, 0 disables the byte bound
    pub max_bytes: usize,
    /// Background sweep interval, 0 disables the sweep
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: cache::DEFAULT_TTL_SECS,
            max_entries: cache::GENERATOR_MAX_ENTRIES,
            max_bytes: cache::GENERATOR_MAX_BYTES,
            sweep_interval_secs: cache::SWEEP_INTERVAL_SECS,
        }
    }
}
