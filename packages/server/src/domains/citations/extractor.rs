use std::collections::HashMap;

use page_fetch::{domain_of, normalize_url};
use tracing::debug;

use super::strategies::{
    BareUrlStrategy, CitationStrategy, MarkdownLinkStrategy, NativeStrategy,
    NumberedReferenceStrategy, ToolCallStrategy,
};
use super::types::{Citation, CitationSource, RawCitation, ResponseEnvelope};

/// Runs the strategy chain; the first strategy that yields at least one valid
/// URL decides the citation list.
pub struct CitationExtractor {
    strategies: Vec<Box<dyn CitationStrategy>>,
}

impl Default for CitationExtractor {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(NativeStrategy),
                Box::new(ToolCallStrategy),
                Box::new(MarkdownLinkStrategy),
                Box::new(BareUrlStrategy),
                Box::new(NumberedReferenceStrategy),
            ],
        }
    }
}

impl CitationExtractor {
    pub fn extract(&self, envelope: &ResponseEnvelope<'_>) -> Vec<Citation> {
        for strategy in &self.strategies {
            let citations = finalize(strategy.candidates(envelope), strategy.source());
            if !citations.is_empty() {
                debug!(
                    strategy = %strategy.source(),
                    count = citations.len(),
                    "extracted citations"
                );
                return citations;
            }
        }
        Vec::new()
    }
}

/// Extract citations with the default strategy chain.
pub fn extract_citations(envelope: &ResponseEnvelope<'_>) -> Vec<Citation> {
    CitationExtractor::default().extract(envelope)
}

/// Normalize, drop invalid URLs, dedupe keeping the first occurrence, and number 1..n.
fn finalize(candidates: Vec<RawCitation>, source: CitationSource) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::with_capacity(candidates.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let Some(url) = normalize_url(&candidate.url) else {
            continue;
        };
        let Some(domain) = domain_of(&url).filter(|d| d.contains('.')) else {
            continue;
        };

        if let Some(&index) = seen.get(&url) {
            // Later duplicates may carry a title the first one lacked
            if citations[index].title.is_none() {
                citations[index].title = candidate.title;
            }
            continue;
        }

        seen.insert(url.clone(), citations.len());
        citations.push(Citation {
            position: citations.len() + 1,
            url,
            domain,
            source,
            title: candidate.title,
        });
    }

    citations
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_native_wins_over_text() {
        let raw = vec![RawCitation::new("https://native.com/a")];
        let envelope = ResponseEnvelope {
            content: "also see https://text.com/b",
            raw_citations: &raw,
            raw: None,
        };
        let citations = extract_citations(&envelope);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].url, "https://native.com/a");
        assert_eq!(citations[0].source, CitationSource::Native);
    }

    #[test]
    fn test_falls_through_empty_strategies() {
        let body = json!({"choices": [{"message": {"content": "x"}}]});
        let envelope = ResponseEnvelope {
            content: "Read https://blog.acme.io/post.",
            raw_citations: &[],
            raw: Some(&body),
        };
        let citations = extract_citations(&envelope);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].source, CitationSource::BareUrl);
        assert_eq!(citations[0].domain, "blog.acme.io");
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let envelope = ResponseEnvelope::text(
            "https://a.com/x, then https://b.com/y and again https://a.com/x/ and https://A.com/x?utm=1.",
        );
        let citations = extract_citations(&envelope);
        assert_eq!(
            citations.iter().map(|c| (c.url.as_str(), c.position)).collect::<Vec<_>>(),
            vec![("https://a.com/x", 1), ("https://b.com/y", 2)]
        );
    }

    #[test]
    fn test_scheme_less_references_are_normalized() {
        let envelope = ResponseEnvelope::text("Summary.\n\n[1] Acme docs - docs.acme.com/start/");
        let citations = extract_citations(&envelope);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].url, "https://docs.acme.com/start");
        assert_eq!(citations[0].source, CitationSource::NumberedReference);
        assert_eq!(citations[0].title.as_deref(), Some("Acme docs"));
    }

    #[test]
    fn test_reference_positions_follow_appearance() {
        let envelope = ResponseEnvelope::text(
            "Summary.\n\n[3] Third - third.io/c\n[1] First - first.io/a\n[2] Second - second.io/b",
        );
        let citations = extract_citations(&envelope);
        assert_eq!(
            citations.iter().map(|c| (c.url.as_str(), c.position)).collect::<Vec<_>>(),
            vec![
                ("https://third.io/c", 1),
                ("https://first.io/a", 2),
                ("https://second.io/b", 3),
            ]
        );
    }

    #[test]
    fn test_no_citations() {
        assert!(extract_citations(&ResponseEnvelope::text("No links here.")).is_empty());
    }

    #[test]
    fn test_invalid_urls_do_not_win_the_chain() {
        let raw = vec![RawCitation::new("ftp://files.example/x")];
        let envelope = ResponseEnvelope {
            content: "[docs](https://docs.rs/regex)",
            raw_citations: &raw,
            raw: None,
        };
        let citations = extract_citations(&envelope);
        assert_eq!(citations[0].source, CitationSource::Markdown);
    }
}
