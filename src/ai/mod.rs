//! AI Integration Layer
//!
//! Provider clients, retry, response caching and the [`Generator`] that ties
//! them together.

pub mod cache;
pub mod generator;
pub mod prompt;
pub mod provider;
pub mod request;
pub mod retry;
pub mod tokenizer;

pub use cache::{CacheConfig, CacheStatistics, ResponseCache};
pub use generator::{CacheStatus, GenerateOptions, Generation, Generator, GeneratorConfig};
pub use prompt::{ContentType, enhance_prompt};
pub use provider::{
    ClaudeProvider, LlmProvider, OpenAiProvider, ProviderConfig, ProviderKind, SharedProvider,
    create_provider,
};
pub use request::{Fingerprint, GenerationRequest, GenerationResult};
pub use retry::{RetryPolicy, run_with_retry};
pub use tokenizer::{CostEstimate, ModelInfo, TokenCounter, TokenEstimator, estimate_cost};
