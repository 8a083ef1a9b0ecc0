//! dox - Resilient AI Content Generation
//!
//! Generates text through OpenAI-compatible and Claude APIs with retries,
//! cancellation, and an in-memory response cache.
//!
//! ## Core Features
//!
//! - **Error Classification**: transient vs permanent provider failures
//! - **Retry Executor**: exponential backoff with jitter, cancellable waits
//! - **Provider Clients**: OpenAI Chat Completions and Anthropic Messages
//! - **Response Cache**: LRU with TTL, entry and byte bounds, statistics
//! - **Generator**: validation, provider detection, cache, dispatch
//!
//! ## Quick Start
//!
//! ```ignore
//! use dox::{ConfigLoader, GenerateOptions, Generator, GeneratorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ConfigLoader::load(None)?;
//! let generator = Generator::new(GeneratorConfig::from(&config));
//! let text = generator
//!     .generate(&CancellationToken::new(), "Write a haiku", &GenerateOptions::default())
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: providers, retry, cache, generator, token estimates
//! - [`config`]: layered configuration
//! - [`types`]: error types and classification
//! - [`cli`]: command handlers for the `dox` binary

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::{DoxError, ErrorCategory, ErrorClassifier, Result};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    // Cache
    CacheConfig,
    CacheStatistics,
    CacheStatus,
    // Prompts
    ContentType,
    // Generator
    GenerateOptions,
    Generation,
    Generator,
    GeneratorConfig,
    // Providers
    LlmProvider,
    ProviderConfig,
    ProviderKind,
    ResponseCache,
    // Retry
    RetryPolicy,
    run_with_retry,
};
