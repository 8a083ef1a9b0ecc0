//! Content Types and Prompt Enhancement
//!
//! A content type selects the system preamble each provider sends and the
//! instructions [`enhance_prompt`] wraps around a bare user prompt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of document the caller wants generated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    Blog,
    Report,
    Summary,
    Email,
    Proposal,
    Code,
    #[default]
    Custom,
    /// Unrecognized tag, kept verbatim so it still reaches the fingerprint
    Other(String),
}

impl ContentType {
    pub const KNOWN_TAGS: [&'static str; 7] = [
        "blog", "report", "summary", "email", "proposal", "code", "custom",
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Blog => "blog",
            Self::Report => "report",
            Self::Summary => "summary",
            Self::Email => "email",
            Self::Proposal => "proposal",
            Self::Code => "code",
            Self::Custom => "custom",
            Self::Other(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for ContentType {
    fn from(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "blog" => Self::Blog,
            "report" => Self::Report,
            "summary" => Self::Summary,
            "email" => Self::Email,
            "proposal" => Self::Proposal,
            "code" => Self::Code,
            "custom" => Self::Custom,
            _ => Self::Other(tag.to_string()),
        }
    }
}

impl From<String> for ContentType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<ContentType> for String {
    fn from(content_type: ContentType) -> Self {
        content_type.as_str().to_string()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrap `prompt` in content-type instructions.
///
/// Prompts that already mention the content type (e.g. "blog" or "article"
/// for blog posts) are returned untouched, as are custom and unknown types.
pub fn enhance_prompt(prompt: &str, content_type: &ContentType) -> String {
    let lower = prompt.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    match content_type {
        ContentType::Blog if !mentions(&["blog", "article"]) => format!(
            "Write a blog post about: {prompt}\n\n\
             Include an engaging title, an introduction, main sections with subheadings, and a conclusion."
        ),
        ContentType::Report if !mentions(&["report"]) => format!(
            "Create a professional report on: {prompt}\n\n\
             Include an executive summary, detailed analysis, key findings, and recommendations."
        ),
        ContentType::Summary if !mentions(&["summar"]) => format!(
            "Summarize the following content:\n\n{prompt}\n\n\
             Keep the summary clear and concise and highlight the main points."
        ),
        ContentType::Email if !mentions(&["email"]) => format!(
            "Write a professional email about: {prompt}\n\n\
             Include a greeting, a clear purpose, organized content, and a professional closing."
        ),
        ContentType::Proposal if !mentions(&["proposal"]) => format!(
            "Create a business proposal for: {prompt}\n\n\
             Include an executive summary, objectives, scope, timeline, and next steps."
        ),
        ContentType::Code if !mentions(&["code", "function"]) => format!(
            "Generate code for: {prompt}\n\n\
             Include proper error handling and comments."
        ),
        _ => prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parsing() {
        assert_eq!(ContentType::from("Blog"), ContentType::Blog);
        assert_eq!(ContentType::from(" email "), ContentType::Email);
        assert_eq!(
            ContentType::from("poem"),
            ContentType::Other("poem".to_string())
        );
        assert!(!ContentType::from("poem").is_known());
        assert_eq!(ContentType::from("poem").as_str(), "poem");
    }

    #[test]
    fn test_content_type_serde() {
        let json = serde_json::to_string(&ContentType::Proposal).unwrap();
        assert_eq!(json, "\"proposal\"");
        let parsed: ContentType = serde_json::from_str("\"code\"").unwrap();
        assert_eq!(parsed, ContentType::Code);
    }

    #[test]
    fn test_enhance_wraps_bare_prompt() {
        let enhanced = enhance_prompt("rust error handling", &ContentType::Blog);
        assert!(enhanced.starts_with("Write a blog post about: rust error handling"));

        let enhanced = enhance_prompt("quarterly sales", &ContentType::Report);
        assert!(enhanced.contains("executive summary"));
    }

    #[test]
    fn test_enhance_skips_prompts_that_name_the_type() {
        let prompt = "Write an article on async Rust";
        assert_eq!(enhance_prompt(prompt, &ContentType::Blog), prompt);

        let prompt = "Please summarize this memo";
        assert_eq!(enhance_prompt(prompt, &ContentType::Summary), prompt);

        let prompt = "a function that parses dates";
        assert_eq!(enhance_prompt(prompt, &ContentType::Code), prompt);
    }

    #[test]
    fn test_enhance_leaves_custom_untouched() {
        assert_eq!(enhance_prompt("anything", &ContentType::Custom), "anything");
        assert_eq!(
            enhance_prompt("anything", &ContentType::Other("poem".into())),
            "anything"
        );
    }
}
