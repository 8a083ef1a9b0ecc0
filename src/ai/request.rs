//! Generation Request and Result
//!
//! A [`GenerationRequest`] is built once per call and is the single source of
//! both the provider wire payload and the cache [`Fingerprint`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::prompt::ContentType;
use super::provider::ProviderKind;

/// Immutable description of one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub provider: ProviderKind,
    pub model: String,
    pub prompt: String,
    pub content_type: ContentType,
    pub max_tokens: u32,
    /// Sampling temperature in `0.0..=1.0`
    pub temperature: f32,
}

impl GenerationRequest {
    /// SHA-256 over every field.
    ///
    /// Fields are length-prefixed so adjacent values can never run together,
    /// and the temperature is hashed by bit pattern.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        for field in [
            self.provider.as_str(),
            self.model.as_str(),
            self.prompt.as_str(),
            self.content_type.as_str(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(self.max_tokens.to_le_bytes());
        hasher.update(self.temperature.to_bits().to_le_bytes());

        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Fingerprint(hex)
    }
}

/// Hex digest identifying a request for cache lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text produced by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub provider: ProviderKind,
    pub model: String,
    pub completed_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn new(text: impl Into<String>, provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider,
            model: model.into(),
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            provider: ProviderKind::OpenAi,
            model: "gpt-3.5-turbo".to_string(),
            prompt: "Write about Rust".to_string(),
            content_type: ContentType::Blog,
            max_tokens: 2000,
            temperature: 0.7,
        }
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = request().fingerprint();
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_each_field_changes_fingerprint() {
        let base = request().fingerprint();

        let mut r = request();
        r.provider = ProviderKind::Claude;
        assert_ne!(r.fingerprint(), base);

        let mut r = request();
        r.model = "gpt-4".to_string();
        assert_ne!(r.fingerprint(), base);

        let mut r = request();
        r.prompt.push('!');
        assert_ne!(r.fingerprint(), base);

        let mut r = request();
        r.content_type = ContentType::Report;
        assert_ne!(r.fingerprint(), base);

        let mut r = request();
        r.max_tokens = 2001;
        assert_ne!(r.fingerprint(), base);

        let mut r = request();
        r.temperature = 0.71;
        assert_ne!(r.fingerprint(), base);
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let mut a = request();
        a.model = "gpt".to_string();
        a.prompt = "-4 hello".to_string();

        let mut b = request();
        b.model = "gpt-4".to_string();
        b.prompt = " hello".to_string();

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    proptest! {
        #[test]
        fn prop_fingerprint_deterministic(
            model in "[a-z0-9-]{1,20}",
            prompt in ".{1,200}",
            max_tokens in 1u32..100_000,
            temperature in 0.0f32..=1.0,
        ) {
            let make = || GenerationRequest {
                provider: ProviderKind::Claude,
                model: model.clone(),
                prompt: prompt.clone(),
                content_type: ContentType::Summary,
                max_tokens,
                temperature,
            };
            prop_assert_eq!(make().fingerprint(), make().fingerprint());
        }

        #[test]
        fn prop_distinct_prompts_distinct_fingerprints(
            a in ".{1,100}",
            b in ".{1,100}",
        ) {
            prop_assume!(a != b);
            let mut left = request();
            left.prompt = a;
            let mut right = request();
            right.prompt = b;
            prop_assert_ne!(left.fingerprint(), right.fingerprint());
        }
    }
}
