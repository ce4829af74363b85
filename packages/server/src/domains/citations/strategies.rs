//! Citation extraction strategies, tried in order by the extractor.
//!
//! Each strategy only proposes candidate URLs. Normalization, deduplication and
//! positions are applied by [`super::CitationExtractor`].

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::types::{CitationSource, RawCitation, ResponseEnvelope};

/// One way of finding cited URLs in a response.
pub trait CitationStrategy: Send + Sync {
    fn source(&self) -> CitationSource;

    fn candidates(&self, envelope: &ResponseEnvelope<'_>) -> Vec<RawCitation>;
}

lazy_static! {
    static ref MARKDOWN_LINK: Regex =
        Regex::new(r"\[([^\]\n]*)\]\((https?://[^\s)]+)\)").unwrap();
    static ref BARE_URL: Regex = Regex::new(r#"https?://[^\s<>"'`\[\]{}|\\^]+"#).unwrap();
    static ref NUMBERED_LINE: Regex =
        Regex::new(r"(?m)^\s*(?:\[(\d{1,3})\]|(\d{1,3})[.)])\s+(.+)$").unwrap();
    static ref SOURCES_HEADING: Regex = Regex::new(
        r"(?im)^\s*(?:#{1,6}\s*)?\**\s*(?:references|sources|citations|bibliography|further reading)\s*\**\s*:?\s*\**\s*$"
    )
    .unwrap();
    static ref DOMAIN_REF: Regex = Regex::new(
        r"(?i)\b((?:https?://)?(?:www\.)?(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+([a-z]{2,24})(?:/[^\s)\]>]*)?)"
    )
    .unwrap();
}

/// TLDs accepted for scheme-less references, to keep `Node.js` and friends out.
const REFERENCE_TLDS: &[&str] = &[
    "com", "org", "net", "io", "co", "ai", "dev", "app", "edu", "gov", "info", "biz", "me",
    "us", "uk", "de", "fr", "ca", "au", "in", "nl", "es", "it", "jp", "news", "blog", "tech",
];

// ============================================================================
// 1. Native citations
// ============================================================================

/// Platform-native citation lists: Perplexity `citations`/`search_results`,
/// OpenAI `url_citation` annotations and Gemini grounding chunks.
pub struct NativeStrategy;

impl CitationStrategy for NativeStrategy {
    fn source(&self) -> CitationSource {
        CitationSource::Native
    }

    fn candidates(&self, envelope: &ResponseEnvelope<'_>) -> Vec<RawCitation> {
        if !envelope.raw_citations.is_empty() {
            return envelope.raw_citations.to_vec();
        }
        envelope.raw.map(native_citations_from_body).unwrap_or_default()
    }
}

/// Pull native citations out of a raw platform response body.
pub fn native_citations_from_body(body: &Value) -> Vec<RawCitation> {
    let mut found = Vec::new();

    // Perplexity
    for url in array(body, "citations").filter_map(Value::as_str) {
        found.push(RawCitation::new(url));
    }
    for result in array(body, "search_results") {
        if let Some(url) = result.get("url").and_then(Value::as_str) {
            found.push(with_optional_title(url, result.get("title")));
        }
    }

    // OpenAI chat completions
    for choice in array(body, "choices") {
        if let Some(annotations) = choice.pointer("/message/annotations").and_then(Value::as_array) {
            collect_url_annotations(annotations, &mut found);
        }
    }

    // OpenAI responses API
    for output in array(body, "output") {
        for part in output.get("content").and_then(Value::as_array).into_iter().flatten() {
            if let Some(annotations) = part.get("annotations").and_then(Value::as_array) {
                collect_url_annotations(annotations, &mut found);
            }
        }
    }

    // Gemini grounding metadata
    for candidate in array(body, "candidates") {
        let chunks = candidate
            .pointer("/groundingMetadata/groundingChunks")
            .and_then(Value::as_array);
        for chunk in chunks.into_iter().flatten() {
            if let Some(web) = chunk.get("web") {
                if let Some(uri) = web.get("uri").and_then(Value::as_str) {
                    found.push(with_optional_title(uri, web.get("title")));
                }
            }
        }
    }

    found
}

fn collect_url_annotations(annotations: &[Value], found: &mut Vec<RawCitation>) {
    for annotation in annotations {
        if annotation.get("type").and_then(Value::as_str) != Some("url_citation") {
            continue;
        }
        // Chat completions nest the payload, the responses API does not
        let inner = annotation.get("url_citation").unwrap_or(annotation);
        if let Some(url) = inner.get("url").and_then(Value::as_str) {
            found.push(with_optional_title(url, inner.get("title")));
        }
    }
}

// ============================================================================
// 2. Tool call results
// ============================================================================

/// URLs inside tool/function call arguments, tool messages and web search calls.
pub struct ToolCallStrategy;

impl CitationStrategy for ToolCallStrategy {
    fn source(&self) -> CitationSource {
        CitationSource::ToolCall
    }

    fn candidates(&self, envelope: &ResponseEnvelope<'_>) -> Vec<RawCitation> {
        let Some(body) = envelope.raw else {
            return Vec::new();
        };
        let mut found = Vec::new();

        for choice in array(body, "choices") {
            let calls = choice.pointer("/message/tool_calls").and_then(Value::as_array);
            for call in calls.into_iter().flatten() {
                match call.pointer("/function/arguments") {
                    // Arguments arrive as a JSON-encoded string
                    Some(Value::String(encoded)) => {
                        if let Ok(parsed) = serde_json::from_str::<Value>(encoded) {
                            collect_urls(&parsed, &mut found);
                        }
                    }
                    Some(other) => collect_urls(other, &mut found),
                    None => {}
                }
            }
        }

        for message in array(body, "messages") {
            if message.get("role").and_then(Value::as_str) == Some("tool") {
                if let Some(content) = message.get("content") {
                    collect_urls(content, &mut found);
                }
            }
        }

        for output in array(body, "output") {
            if output.get("type").and_then(Value::as_str) == Some("web_search_call") {
                if let Some(action) = output.get("action") {
                    collect_urls(action, &mut found);
                }
            }
        }

        found
    }
}

/// Depth-first walk collecting `url`/`uri`/`link` string fields.
fn collect_urls(value: &Value, found: &mut Vec<RawCitation>) {
    match value {
        Value::Object(map) => {
            for key in ["url", "uri", "link"] {
                if let Some(url) = map.get(key).and_then(Value::as_str) {
                    if is_http(url) {
                        found.push(with_optional_title(url, map.get("title")));
                    }
                }
            }
            for (key, child) in map {
                if !matches!(key.as_str(), "url" | "uri" | "link") {
                    collect_urls(child, found);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_urls(item, found)),
        Value::String(text) => {
            // Tool messages often carry JSON as text
            if let Ok(parsed @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str(text) {
                collect_urls(&parsed, found);
            }
        }
        _ => {}
    }
}

// ============================================================================
// 3. Markdown links
// ============================================================================

pub struct MarkdownLinkStrategy;

impl CitationStrategy for MarkdownLinkStrategy {
    fn source(&self) -> CitationSource {
        CitationSource::Markdown
    }

    fn candidates(&self, envelope: &ResponseEnvelope<'_>) -> Vec<RawCitation> {
        MARKDOWN_LINK
            .captures_iter(envelope.content)
            .map(|caps| RawCitation::new(&caps[2]).with_title(caps[1].trim()))
            .collect()
    }
}

// ============================================================================
// 4. Bare URLs
// ============================================================================

pub struct BareUrlStrategy;

impl CitationStrategy for BareUrlStrategy {
    fn source(&self) -> CitationSource {
        CitationSource::BareUrl
    }

    fn candidates(&self, envelope: &ResponseEnvelope<'_>) -> Vec<RawCitation> {
        BARE_URL
            .find_iter(envelope.content)
            .map(|m| trim_trailing_punctuation(m.as_str()))
            .filter(|url| url.len() > "https://".len())
            .map(RawCitation::new)
            .collect()
    }
}

/// Strip sentence punctuation and unbalanced closing brackets from the end of a URL.
pub fn trim_trailing_punctuation(url: &str) -> &str {
    let mut end = url;
    loop {
        let Some(last) = end.chars().last() else {
            return end;
        };
        let unbalanced = match last {
            ')' => end.matches('(').count() < end.matches(')').count(),
            ']' => end.matches('[').count() < end.matches(']').count(),
            _ => false,
        };
        if unbalanced || matches!(last, '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"' | '*' | '_' | '>') {
            end = &end[..end.len() - last.len_utf8()];
        } else {
            return end;
        }
    }
}

// ============================================================================
// 5. Numbered references
// ============================================================================

/// `[1] Title - site.com/page` style lines and domains listed under a
/// "Sources"/"References" heading. Handles references written without a scheme.
pub struct NumberedReferenceStrategy;

impl CitationStrategy for NumberedReferenceStrategy {
    fn source(&self) -> CitationSource {
        CitationSource::NumberedReference
    }

    fn candidates(&self, envelope: &ResponseEnvelope<'_>) -> Vec<RawCitation> {
        let content = envelope.content;

        // Order of appearance, not reference number
        let mut found: Vec<RawCitation> = NUMBERED_LINE
            .captures_iter(content)
            .filter_map(|caps| {
                let rest = caps.get(3)?.as_str();
                let url = first_reference(rest)?;
                let title = rest[..rest.find(url).unwrap_or(0)]
                    .trim()
                    .trim_end_matches(['-', ':', '|', '–'])
                    .trim();
                Some(RawCitation::new(url).with_title(title))
            })
            .collect();

        if let Some(heading) = SOURCES_HEADING.find(content) {
            for line in content[heading.end()..].lines() {
                if let Some(url) = first_reference(line) {
                    found.push(RawCitation::new(url));
                }
            }
        }

        found
    }
}

fn first_reference(text: &str) -> Option<&str> {
    DOMAIN_REF.captures_iter(text).find_map(|caps| {
        let whole = caps.get(1)?.as_str();
        let tld = caps.get(2)?.as_str().to_ascii_lowercase();
        let explicit = whole.contains("://") || whole.to_ascii_lowercase().starts_with("www.");
        (explicit || REFERENCE_TLDS.contains(&tld.as_str())).then(|| trim_trailing_punctuation(whole))
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn array<'a>(body: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    body.get(key).and_then(Value::as_array).into_iter().flatten()
}

fn with_optional_title(url: &str, title: Option<&Value>) -> RawCitation {
    match title.and_then(Value::as_str) {
        Some(title) => RawCitation::new(url).with_title(title),
        None => RawCitation::new(url),
    }
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
