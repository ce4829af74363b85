use serde::{Deserialize, Serialize};

/// Content quality scores for a cited page, each on a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentQualityRecord {
    pub relevance: u8,
    pub depth: u8,
    pub authority: u8,
    pub readability: u8,
    pub overall: u8,
    pub summary: String,
    /// True when scoring failed and this record is the placeholder
    #[serde(default)]
    pub is_fallback: bool,
}

impl ContentQualityRecord {
    /// Record used whenever a page cannot be scored.
    pub fn fallback() -> Self {
        Self {
            relevance: 0,
            depth: 0,
            authority: 0,
            readability: 0,
            overall: 0,
            summary: "Content quality unavailable".to_string(),
            is_fallback: true,
        }
    }

    /// Clamp every score into range. Returns `None` if the summary is missing.
    pub fn validated(mut self) -> Option<Self> {
        if self.summary.trim().is_empty() {
            return None;
        }
        for score in [
            &mut self.relevance,
            &mut self.depth,
            &mut self.authority,
            &mut self.readability,
            &mut self.overall,
        ] {
            *score = (*score).min(100);
        }
        self.is_fallback = false;
        Some(self)
    }
}

/// How a response talks about the brand and its competitors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseClassification {
    pub brand_mentioned: bool,
    pub brand_mention_count: u32,
    /// 1-based rank of the brand among all mentioned entities, by first appearance
    pub first_mention_rank: Option<u32>,
    pub competitor_mentions: Vec<CompetitorMention>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorMention {
    pub name: String,
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_clamps_scores() {
        let record = ContentQualityRecord {
            relevance: 250,
            depth: 40,
            authority: 60,
            readability: 100,
            overall: 101,
            summary: "Thorough comparison page".into(),
            is_fallback: true,
        }
        .validated()
        .unwrap();

        assert_eq!(record.relevance, 100);
        assert_eq!(record.overall, 100);
        assert!(!record.is_fallback);
    }

    #[test]
    fn test_validated_rejects_empty_summary() {
        let mut record = ContentQualityRecord::fallback();
        record.summary = "  ".into();
        assert!(record.validated().is_none());
    }
}
