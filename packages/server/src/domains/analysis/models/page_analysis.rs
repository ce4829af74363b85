use chrono::{DateTime, Utc};
use page_fetch::{CrawlMethod, CrawlResult};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::quality::ContentQualityRecord;
use crate::domains::citations::{Citation, CitationSource};

/// How far analysis of a cited page got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "page_analysis_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PageAnalysisStatus {
    /// Fetched and scored
    #[default]
    Analyzed,
    /// Served from an expired cache entry after a refresh failed
    Stale,
    /// Skipped by pre-flight rules, no request made
    Skipped,
    /// Page returned 404/410
    NotFound,
    /// Every tier failed
    CrawlFailed,
}

/// PageAnalysis - fetch and scoring outcome for one cited URL
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PageAnalysis {
    pub id: Uuid,
    pub query_result_id: Uuid,
    pub run_id: Uuid,
    pub url: String,
    pub domain: String,
    pub position: i32,
    pub citation_source: String,
    pub title: Option<String>,
    pub status: PageAnalysisStatus,

    // Crawl
    pub crawl_method: String,
    pub status_code: Option<i32>,
    pub word_count: i32,
    pub credits_spent: i32,
    #[sqlx(json)]
    pub crawl_attempts: Vec<CrawlResult>,
    pub error_message: Option<String>,

    #[sqlx(json)]
    pub quality: ContentQualityRecord,

    pub created_at: DateTime<Utc>,
}

impl PageAnalysis {
    /// Start an analysis record for a citation; crawl fields are filled in by the caller.
    pub fn for_citation(run_id: Uuid, query_result_id: Uuid, citation: &Citation) -> Self {
        Self {
            id: Uuid::now_v7(),
            query_result_id,
            run_id,
            url: citation.url.clone(),
            domain: citation.domain.clone(),
            position: citation.position as i32,
            citation_source: citation.source.as_str().to_string(),
            title: citation.title.clone(),
            status: PageAnalysisStatus::CrawlFailed,
            crawl_method: CrawlMethod::Failed.as_str().to_string(),
            status_code: None,
            word_count: 0,
            credits_spent: 0,
            crawl_attempts: Vec::new(),
            error_message: None,
            quality: ContentQualityRecord::fallback(),
            created_at: Utc::now(),
        }
    }

    pub fn citation_source(&self) -> Option<CitationSource> {
        serde_json::from_value(serde_json::Value::String(self.citation_source.clone())).ok()
    }

    pub fn is_degraded(&self) -> bool {
        self.status != PageAnalysisStatus::Analyzed || self.quality.is_fallback
    }
}
