//! Unified Error Type System
//!
//! Centralized error types for the entire crate.
//! Provides structural error classification for retry decisions.
//!
//! ## Error Categories
//!
//! - **RateLimit**: API rate limiting (wait and retry)
//! - **Overloaded**: Provider temporarily saturated (wait and retry)
//! - **Server**: 5xx responses (retry with backoff)
//! - **Network**: Connectivity issues (retry with backoff)
//! - **Auth** / **BadRequest**: Caller mistakes (fail fast)
//!
//! Classification inspects error variants and HTTP status codes. Free-text
//! matching is only used for provider errors that carry no status.

use std::path::PathBuf;
use thiserror::Error;

use crate::constants::retry::{RETRYABLE_STATUSES, TRANSIENT_PATTERNS};

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories used for logging and routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited by the provider
    RateLimit,
    /// Provider overloaded
    Overloaded,
    /// Authentication or permission failure
    Auth,
    /// Malformed or rejected request
    BadRequest,
    /// Provider-side 5xx failure
    Server,
    /// Connectivity issue before a response arrived
    Network,
    /// Caller cancelled the operation
    Cancelled,
    /// Input rejected before any work started
    Validation,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Overloaded => write!(f, "OVERLOADED"),
            Self::Auth => write!(f, "AUTH"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Server => write!(f, "SERVER"),
            Self::Network => write!(f, "NETWORK"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Category implied by an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            401 | 403 => Self::Auth,
            400..=499 => Self::BadRequest,
            529 => Self::Overloaded,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }
}

// =============================================================================
// Provider Error
// =============================================================================

/// Error reported by a provider API, either parsed from its structured error
/// body or built from the raw status and body when parsing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Provider that produced the error
    pub provider: String,
    /// HTTP status code, 0 when no response was received
    pub status: u16,
    /// Human-readable message (raw body for unstructured errors)
    pub message: String,
    /// Provider error type tag, e.g. `rate_limit_error`
    pub error_type: Option<String>,
    /// Provider error code, e.g. `rate_limit_exceeded`
    pub code: Option<String>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} API error", self.provider)?;
        if self.status != 0 {
            write!(f, " (HTTP {})", self.status)?;
        }
        if let Some(error_type) = &self.error_type {
            write!(f, " [{}]", error_type)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Create an error with status and message only
    pub fn new(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status,
            message: message.into(),
            error_type: None,
            code: None,
        }
    }

    /// Add the provider's error type tag
    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Add the provider's error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Whether the error type tag equals one of `types`
    pub fn has_type(&self, types: &[&str]) -> bool {
        self.error_type
            .as_deref()
            .is_some_and(|t| types.contains(&t))
    }

    /// Whether the error code equals one of `codes`
    pub fn has_code(&self, codes: &[&str]) -> bool {
        self.code.as_deref().is_some_and(|c| codes.contains(&c))
    }

    pub fn category(&self) -> ErrorCategory {
        if self.has_type(&["rate_limit_error"]) || self.has_code(&["rate_limit_exceeded"]) {
            return ErrorCategory::RateLimit;
        }
        if self.has_type(&["overloaded_error"]) {
            return ErrorCategory::Overloaded;
        }
        ErrorCategory::from_status(self.status)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Structured validation error with context
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// What validation failed
    pub kind: ValidationErrorKind,
    /// Field or component that failed validation
    pub field: Option<String>,
    /// Detailed message
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "Validation failed for '{}': {}", field, self.message)
        } else {
            write!(f, "Validation failed: {}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            message: message.into(),
        }
    }

    /// Add field context
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Validation error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Required value missing or blank
    MissingField,
    /// Invalid format
    Format,
    /// Value out of range
    Range,
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum DoxError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Validation(ValidationError),

    #[error("Cannot read prompt file {}: {source}", path.display())]
    PromptFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Provider Errors
    // -------------------------------------------------------------------------
    /// Request never produced an HTTP response
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0}")]
    Provider(ProviderError),

    /// Provider answered successfully but without any content
    #[error("{provider} returned no content")]
    EmptyCompletion { provider: String },

    #[error("Failed to parse {provider} response: {message}")]
    ResponseParse { provider: String, message: String },

    // -------------------------------------------------------------------------
    // Runtime Errors
    // -------------------------------------------------------------------------
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<ProviderError> for DoxError {
    fn from(err: ProviderError) -> Self {
        DoxError::Provider(err)
    }
}

impl From<ValidationError> for DoxError {
    fn from(err: ValidationError) -> Self {
        DoxError::Validation(err)
    }
}

pub type Result<T> = std::result::Result<T, DoxError>;

impl DoxError {
    /// Create a validation error for a field
    pub fn validation(
        kind: ValidationErrorKind,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation(ValidationError::new(kind, message).with_field(field))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Provider the error originated from, if any
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Transport { provider, .. }
            | Self::EmptyCompletion { provider }
            | Self::ResponseParse { provider, .. } => Some(provider),
            Self::Provider(e) => Some(&e.provider),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(e) => e.category(),
            Self::Transport { .. } => ErrorCategory::Network,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Validation(_) | Self::PromptFile { .. } => ErrorCategory::Validation,
            Self::Config(_) => ErrorCategory::BadRequest,
            _ => ErrorCategory::Unknown,
        }
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Decides whether a failed attempt deserves another try.
///
/// This is the base table shared by every provider. Rate-limit and overload
/// errors are retryable whatever their status. Provider clients layer their
/// vendor-specific error types on top of it.
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn is_retryable(err: &DoxError) -> bool {
        match err {
            DoxError::Provider(e)
                if matches!(
                    e.category(),
                    ErrorCategory::RateLimit | ErrorCategory::Overloaded
                ) =>
            {
                true
            }
            DoxError::Provider(e) if e.status == 0 => Self::is_transient_message(&e.message),
            DoxError::Provider(e) => Self::is_retryable_status(e.status),
            DoxError::Transport { source, .. } => {
                source.is_timeout()
                    || source.is_connect()
                    || source.is_request()
                    || Self::is_transient_message(&source.to_string())
            }
            DoxError::Io(e) => {
                use std::io::ErrorKind;
                matches!(
                    e.kind(),
                    ErrorKind::ConnectionRefused
                        | ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::TimedOut
                ) || Self::is_transient_message(&e.to_string())
            }
            _ => false,
        }
    }

    /// 429 and the gateway-class 5xx statuses are retryable, nothing else
    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }

    /// Heuristic for errors that carry no structure
    pub fn is_transient_message(message: &str) -> bool {
        let lower = message.to_lowercase();
        TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
    }
}

// =============================================================================
// Tests
// =============================================================================
