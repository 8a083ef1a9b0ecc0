//! Token Counting and Cost Estimation
//!
//! Offline estimates used by `dox generate --dry-run`.
//!
//! ## Strategy
//! - Estimate prompt size without a vendor tokenizer
//! - Look up context window and output limits per model family
//! - Price a request from per-million token rates
//!
//! Estimates are deliberately rough; actual tokenization varies per model.

use serde::Serialize;
use std::fmt;

/// Token estimation method
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TokenEstimator {
    /// Simple character-based estimation (4 chars = 1 token)
    CharBased,
    /// Word-based estimation (1.3 tokens per word on average)
    WordBased,
    /// Average of the word and character estimates plus 10% for formatting
    #[default]
    Blended,
}

/// Token counter for prompt estimation
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter {
    estimator: TokenEstimator,
}

impl TokenCounter {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Estimate token count for a string
    pub fn count(&self, text: &str) -> usize {
        let text = text.trim();
        match self.estimator {
            TokenEstimator::CharBased => Self::count_char_based(text),
            TokenEstimator::WordBased => Self::count_word_based(text),
            TokenEstimator::Blended => Self::count_blended(text),
        }
    }

    fn count_char_based(text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    fn count_word_based(text: &str) -> usize {
        (text.split_whitespace().count() as f64 * 1.3).ceil() as usize
    }

    fn count_blended(text: &str) -> usize {
        let by_words = (text.split_whitespace().count() as f64 * 1.3) as usize;
        let by_chars = text.len() / 4;
        let average = (by_words + by_chars) / 2;
        (average as f64 * 1.1) as usize
    }

    /// Check if content fits within a token budget
    pub fn fits_budget(&self, text: &str, budget: usize) -> bool {
        self.count(text) <= budget
    }
}

// =============================================================================
// Model Limits
// =============================================================================

/// Context limits of a model family
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model: String,
    /// Maximum input tokens
    pub context_window: usize,
    /// Maximum output tokens
    pub max_output: usize,
}

impl ModelInfo {
    pub fn for_model(model: &str) -> Self {
        let (context_window, max_output) = if is_gpt4_turbo(model) {
            (128_000, 4096)
        } else if model.starts_with("gpt-4") {
            (8192, 4096)
        } else if model.starts_with("gpt-3.5-turbo-16k") {
            (16_384, 4096)
        } else if model.starts_with("gpt-3.5-turbo") {
            (4096, 4096)
        } else if model.contains("claude-3") {
            (200_000, 4096)
        } else {
            (4096, 2048)
        };

        Self {
            model: model.to_string(),
            context_window,
            max_output,
        }
    }

    pub fn fits_context(&self, prompt_tokens: usize) -> bool {
        prompt_tokens <= self.context_window
    }
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model Information:")?;
        writeln!(f, "  Model:         {}", self.model)?;
        writeln!(f, "  Context:       {} tokens", self.context_window)?;
        write!(f, "  Max output:    {} tokens", self.max_output)
    }
}

fn is_gpt4_turbo(model: &str) -> bool {
    model.starts_with("gpt-4-turbo") || model.starts_with("gpt-4-1106")
}

// =============================================================================
// Cost Estimation
// =============================================================================

/// Price in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TokenPricing {
    pub prompt: f64,
    pub completion: f64,
}

impl TokenPricing {
    pub fn for_model(model: &str) -> Self {
        let (prompt, completion) = if is_gpt4_turbo(model) {
            (10.0, 30.0)
        } else if model.starts_with("gpt-4") {
            (30.0, 60.0)
        } else if model.starts_with("gpt-3.5-turbo") {
            (0.5, 1.5)
        } else if model.contains("claude-3-opus") {
            (15.0, 75.0)
        } else if model.contains("claude-3-sonnet") {
            (3.0, 15.0)
        } else if model.contains("claude-3-haiku") {
            (0.25, 1.25)
        } else {
            (1.0, 2.0)
        };
        Self { prompt, completion }
    }
}

/// Estimated token usage and price of one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub amount: f64,
    pub currency: &'static str,
}

impl CostEstimate {
    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Token Estimate:")?;
        writeln!(f, "  Input tokens:  ~{}", self.prompt_tokens)?;
        writeln!(f, "  Output tokens: ~{} (max)", self.completion_tokens)?;
        writeln!(f, "  Total tokens:  ~{}", self.total_tokens())?;
        writeln!(f)?;
        writeln!(f, "Estimated Cost:")?;
        write!(f, "  ~${:.4} {}", self.amount, self.currency)
    }
}

/// Estimate the price of a request from token counts
pub fn estimate_cost(model: &str, prompt_tokens: usize, completion_tokens: usize) -> CostEstimate {
    let pricing = TokenPricing::for_model(model);
    let amount = (prompt_tokens as f64 / 1_000_000.0) * pricing.prompt
        + (completion_tokens as f64 / 1_000_000.0) * pricing.completion;

    CostEstimate {
        prompt_tokens,
        completion_tokens,
        amount,
        currency: "USD",
    }
}
