//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Retry executor constants
pub mod retry {
    /// Default maximum retries after the first attempt
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Delay before the first retry (milliseconds)
    pub const INITIAL_DELAY_MS: u64 = 1_000;

    /// Ceiling for any single backoff wait (milliseconds)
    pub const MAX_DELAY_MS: u64 = 30_000;

    /// Ceiling used by provider clients, which retry more eagerly (milliseconds)
    pub const PROVIDER_MAX_DELAY_MS: u64 = 10_000;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f64 = 2.0;

    /// Upper bound of the random jitter, as a fraction of the computed delay
    pub const JITTER_RATIO: f64 = 0.25;

    /// HTTP statuses worth another attempt
    pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

    /// Substrings that mark an untyped error as transient
    pub const TRANSIENT_PATTERNS: [&str; 8] = [
        "connection refused",
        "connection reset",
        "timeout",
        "rate limit",
        "too many requests",
        "service unavailable",
        "bad gateway",
        "gateway timeout",
    ];
}

/// Response cache constants
pub mod cache {
    /// Default entry ceiling for a standalone cache
    pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

    /// Default byte ceiling for a standalone cache (100 MiB)
    pub const DEFAULT_MAX_BYTES: usize = 100 * 1024 * 1024;

    /// Default time-to-live (seconds)
    pub const DEFAULT_TTL_SECS: u64 = 3_600;

    /// Interval between background sweeps of expired entries (seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 300;

    /// Entry ceiling used by the generator when caching is switched on
    pub const GENERATOR_MAX_ENTRIES: usize = 100;

    /// Byte ceiling used by the generator when caching is switched on (50 MiB)
    pub const GENERATOR_MAX_BYTES: usize = 50 * 1024 * 1024;
}

/// Network constants
pub mod network {
    /// OpenAI request timeout (seconds)
    pub const OPENAI_TIMEOUT_SECS: u64 = 30;

    /// Claude request timeout (seconds)
    pub const CLAUDE_TIMEOUT_SECS: u64 = 60;

    /// Anthropic API version header value
    pub const ANTHROPIC_VERSION: &str = "2023-06-01";

    /// Longest error body kept verbatim in a generic provider error
    pub const MAX_ERROR_BODY_CHARS: usize = 2_000;
}

/// Generation defaults
pub mod generate {
    /// Default output token limit
    pub const DEFAULT_MAX_TOKENS: u32 = 2_000;

    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Default concurrency for batch generation
    pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;
}
