//! Local, deterministic brand/competitor mention classifier.

use regex::Regex;

use crate::domains::analysis::models::{CompetitorMention, ResponseClassification};
use crate::kernel::jobs::QueryPayload;
use crate::kernel::traits::BaseResponseClassifier;

#[derive(Debug, Clone, Default)]
pub struct MentionClassifier;

impl MentionClassifier {
    pub fn new() -> Self {
        Self
    }
}

/// Occurrence count and first byte offset for any of `terms`, matched on word
/// boundaries, case-insensitively. Overlapping matches (`Acme` inside `acme.io`)
/// count once.
fn find_mentions(content: &str, terms: &[&str]) -> (u32, Option<usize>) {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for term in terms.iter().filter(|t| !t.trim().is_empty()) {
        let pattern = format!(r"(?i)\b{}\b", regex::escape(term.trim()));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        spans.extend(re.find_iter(content).map(|m| (m.start(), m.end())));
    }
    spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut count = 0;
    let mut covered_until = 0;
    for (start, end) in &spans {
        if count > 0 && *start < covered_until {
            continue;
        }
        count += 1;
        covered_until = *end;
    }
    (count, spans.first().map(|(start, _)| *start))
}

impl BaseResponseClassifier for MentionClassifier {
    fn classify(&self, content: &str, payload: &QueryPayload) -> ResponseClassification {
        let (brand_count, brand_first) = find_mentions(content, &payload.brand.terms());

        let mut firsts: Vec<usize> = Vec::new();
        let mut competitor_mentions = Vec::new();
        for competitor in &payload.competitors {
            let (count, first) = find_mentions(content, &[competitor.as_str()]);
            if let Some(first) = first {
                firsts.push(first);
            }
            if count > 0 {
                competitor_mentions.push(CompetitorMention {
                    name: competitor.clone(),
                    count,
                });
            }
        }

        let first_mention_rank = brand_first
            .map(|brand_at| firsts.iter().filter(|&&at| at < brand_at).count() as u32 + 1);

        ResponseClassification {
            brand_mentioned: brand_count > 0,
            brand_mention_count: brand_count,
            first_mention_rank,
            competitor_mentions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BrandContext, Platform};

    fn payload() -> QueryPayload {
        QueryPayload {
            query_text: "best project tools".into(),
            platform: Platform::ChatGpt,
            brand: BrandContext::new("Acme").with_domain("acme.io"),
            competitors: vec!["Globex".into(), "Initech".into(), "Umbrella".into()],
        }
    }

    #[test]
    fn test_rank_counts_competitors_mentioned_earlier() {
        let content = "Top picks: Globex, then Acme. Some prefer acme.io over Initech.";
        let result = MentionClassifier::new().classify(content, &payload());

        assert!(result.brand_mentioned);
        assert_eq!(result.brand_mention_count, 2);
        assert_eq!(result.first_mention_rank, Some(2));
        assert_eq!(
            result.competitor_mentions,
            vec![
                CompetitorMention { name: "Globex".into(), count: 1 },
                CompetitorMention { name: "Initech".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_word_boundaries() {
        let content = "Acmeology is not a brand mention.";
        let result = MentionClassifier::new().classify(content, &payload());
        assert!(!result.brand_mentioned);
        assert_eq!(result.first_mention_rank, None);
    }
}
