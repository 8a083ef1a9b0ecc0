pub mod error;

pub use error::{
    DoxError, ErrorCategory, ErrorClassifier, ProviderError, Result, ValidationError,
    ValidationErrorKind,
};
