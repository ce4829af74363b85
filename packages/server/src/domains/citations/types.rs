use serde::{Deserialize, Serialize};

/// Which extraction strategy produced a citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationSource {
    /// Platform-native citation list or annotations
    Native,
    /// URLs found in tool/function call results
    ToolCall,
    /// `[text](url)` links in the answer body
    Markdown,
    /// Plain URLs in the answer body
    BareUrl,
    /// Numbered references or a trailing "Sources" section
    NumberedReference,
}

impl CitationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CitationSource::Native => "native",
            CitationSource::ToolCall => "tool_call",
            CitationSource::Markdown => "markdown",
            CitationSource::BareUrl => "bare_url",
            CitationSource::NumberedReference => "numbered_reference",
        }
    }
}

impl std::fmt::Display for CitationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A citation exactly as a platform reported it, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCitation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl RawCitation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = (!title.trim().is_empty()).then_some(title);
        self
    }
}

/// A normalized citation with its 1-based position in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub domain: String,
    pub position: usize,
    pub source: CitationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Inputs the extractor reads: answer text, any native citations the
/// dispatcher already pulled out, and the raw response body.
#[derive(Debug, Clone, Copy)]
pub struct ResponseEnvelope<'a> {
    pub content: &'a str,
    pub raw_citations: &'a [RawCitation],
    pub raw: Option<&'a serde_json::Value>,
}

impl<'a> ResponseEnvelope<'a> {
    pub fn text(content: &'a str) -> Self {
        Self {
            content,
            raw_citations: &[],
            raw: None,
        }
    }
}
