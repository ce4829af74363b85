//! Per-item query execution.
//!
//! ```text
//! dispatch query ──► extract citations ──► classify mentions
//!                                              │
//!                         save query result ◄──┘
//!                                │
//!            fetch + score each cited page (bounded concurrency)
//!                                │
//!                       save page analyses
//! ```
//!
//! Page problems never fail the item: an unreachable page is recorded as a
//! degraded analysis with the fallback quality record. Only dispatch and
//! storage errors propagate, and only a permanent dispatch error stops retries.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use page_fetch::content::html_to_markdown;
use page_fetch::{CacheMode, FetchError, Freshness};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domains::analysis::models::{
    ContentQualityRecord, PageAnalysis, PageAnalysisStatus, QueryResult,
};
use crate::domains::citations::{Citation, CitationExtractor, ResponseEnvelope};
use crate::kernel::jobs::{ErrorKind, HandlerError, WorkItem, WorkItemHandler};
use crate::kernel::{DispatchError, PipelineDeps, ScoringRequest};

/// Pages fetched at once for a single query. The global [`ConcurrencyLimit`]
/// still bounds the total across items.
///
/// [`ConcurrencyLimit`]: crate::kernel::ConcurrencyLimit
const DEFAULT_PAGE_CONCURRENCY: usize = 3;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("concurrency limit unavailable: {0:#}")]
    Limit(anyhow::Error),
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Dispatch(e) if !e.is_retryable() => ErrorKind::NonRetryable,
            _ => ErrorKind::Retryable,
        }
    }
}

impl From<ExecutionError> for HandlerError {
    fn from(err: ExecutionError) -> Self {
        HandlerError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// What one execution produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub query_result_id: Uuid,
    pub citations: usize,
    pub pages_analyzed: usize,
    pub pages_degraded: usize,
    pub credits_spent: u32,
}

/// Runs the full pipeline for one work item.
pub struct QueryExecutor {
    deps: PipelineDeps,
    extractor: CitationExtractor,
    page_concurrency: usize,
}

impl QueryExecutor {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps,
            extractor: CitationExtractor::default(),
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
        }
    }

    pub fn with_page_concurrency(mut self, page_concurrency: usize) -> Self {
        self.page_concurrency = page_concurrency.max(1);
        self
    }

    pub async fn execute_item(&self, item: &WorkItem) -> Result<ExecutionSummary, ExecutionError> {
        let payload = &item.payload;

        // 1. Ask the platform
        let response = {
            let _permit = self.deps.limit.acquire().await.map_err(ExecutionError::Limit)?;
            self.deps
                .dispatcher
                .dispatch(payload.platform, &payload.query_text)
                .await?
        };

        // 2. Citations and mentions
        let envelope = ResponseEnvelope {
            content: &response.content,
            raw_citations: &response.raw_citations,
            raw: Some(&response.raw),
        };
        let citations = self.extractor.extract(&envelope);
        let classification = self.deps.classifier.classify(&response.content, payload);

        let result = QueryResult::new(
            item.run_id,
            item.id,
            payload.query_text.clone(),
            payload.platform,
            response.content.clone(),
            citations.clone(),
            classification,
        );
        let query_result_id = self
            .deps
            .results
            .save_query_result(&result)
            .await
            .map_err(ExecutionError::Storage)?;

        // 3. Cited pages
        let analyses: Vec<_> = citations
            .iter()
            .map(|citation| self.analyze_page(item, query_result_id, citation))
            .collect();
        let pages: Vec<PageAnalysis> = stream::iter(analyses)
            .buffered(self.page_concurrency)
            .collect()
            .await;

        self.deps
            .results
            .save_page_analyses(&pages)
            .await
            .map_err(ExecutionError::Storage)?;

        let summary = ExecutionSummary {
            query_result_id,
            citations: citations.len(),
            pages_analyzed: pages.iter().filter(|p| !p.is_degraded()).count(),
            pages_degraded: pages.iter().filter(|p| p.is_degraded()).count(),
            credits_spent: pages.iter().map(|p| p.credits_spent.max(0) as u32).sum(),
        };

        info!(
            item_id = %item.id,
            platform = %payload.platform,
            citations = summary.citations,
            degraded = summary.pages_degraded,
            credits = summary.credits_spent,
            "query executed"
        );
        Ok(summary)
    }

    /// Fetch and score one cited page. Always returns a record.
    async fn analyze_page(
        &self,
        item: &WorkItem,
        query_result_id: Uuid,
        citation: &Citation,
    ) -> PageAnalysis {
        let mut analysis = PageAnalysis::for_citation(item.run_id, query_result_id, citation);

        let fetched = match self.deps.limit.acquire().await {
            Ok(_permit) => self.deps.fetcher.fetch(&citation.url, CacheMode::Default).await,
            Err(e) => {
                analysis.error_message = Some(e.to_string());
                return analysis;
            }
        };

        let cached = match fetched {
            Ok(cached) => cached,
            Err(err) => {
                analysis.status = match &err {
                    FetchError::Skipped { .. } => PageAnalysisStatus::Skipped,
                    FetchError::NotFound { .. } => PageAnalysisStatus::NotFound,
                    FetchError::Exhausted { .. } => PageAnalysisStatus::CrawlFailed,
                };
                analysis.crawl_attempts = err.attempts().to_vec();
                analysis.status_code = analysis
                    .crawl_attempts
                    .iter()
                    .rev()
                    .find_map(|a| a.status_code)
                    .map(i32::from);
                analysis.credits_spent = credits(&analysis);
                analysis.error_message = Some(err.to_string());
                debug!(url = %citation.url, error = %err, "cited page unavailable");
                return analysis;
            }
        };

        let outcome = cached.value;
        let page = &outcome.page;
        analysis.status = match cached.freshness {
            Freshness::Stale => PageAnalysisStatus::Stale,
            Freshness::Fresh | Freshness::Fetched => PageAnalysisStatus::Analyzed,
        };
        analysis.crawl_method = page.method.as_str().to_string();
        analysis.status_code = Some(i32::from(page.status_code));
        analysis.word_count = page.word_count as i32;
        if analysis.title.is_none() {
            analysis.title = page.title.clone();
        }
        // Cache hits cost nothing this time around
        if cached.freshness == Freshness::Fetched {
            analysis.crawl_attempts = outcome.attempts.clone();
            analysis.credits_spent = credits(&analysis);
        }

        let markdown = html_to_markdown(&page.html);
        analysis.quality = match self.deps.limit.acquire().await {
            Ok(_permit) => {
                self.deps
                    .scorer
                    .score(&ScoringRequest {
                        url: &citation.url,
                        title: analysis.title.as_deref(),
                        markdown: &markdown,
                        query_text: &item.payload.query_text,
                        brand: &item.payload.brand,
                    })
                    .await
            }
            Err(e) => {
                warn!(url = %citation.url, error = %e, "skipping scoring");
                ContentQualityRecord::fallback()
            }
        };

        analysis
    }
}

fn credits(analysis: &PageAnalysis) -> i32 {
    analysis
        .crawl_attempts
        .iter()
        .map(|a| a.method.credit_cost() as i32)
        .sum()
}

#[async_trait]
impl WorkItemHandler for QueryExecutor {
    async fn execute(&self, item: &WorkItem) -> Result<(), HandlerError> {
        self.execute_item(item).await.map(|_| ()).map_err(HandlerError::from)
    }
}

#[cfg(test)]
mod tests {
    use page_fetch::{CrawlMethod, TierError};

    use super::*;
    use crate::common::{BrandContext, Platform};
    use crate::domains::analysis::store::ResultStore;
    use crate::kernel::jobs::QueryPayload;
    use crate::kernel::test_dependencies::{MockQueryDispatcher, TestDependencies};
    use page_fetch::testing::MockTierClient;

    const ARTICLE: &str = "<html><head><title>Acme Review</title></head><body><article><p>Acme is a project tool used by many teams to plan work, track tasks and ship releases on time.</p></article></body></html>";

    fn item(query: &str) -> WorkItem {
        WorkItem::builder()
            .run_id(Uuid::new_v4())
            .payload(QueryPayload {
                query_text: query.to_string(),
                platform: Platform::Perplexity,
                brand: BrandContext::new("Acme"),
                competitors: vec!["Globex".to_string()],
            })
            .build()
    }

    #[tokio::test]
    async fn test_execute_records_result_and_pages() {
        let test_deps = TestDependencies::new()
            .mock_dispatcher(MockQueryDispatcher::new().with_cited_response(
                "best tools",
                "Acme leads, Globex follows.",
                &["https://reviews.io/acme", "https://gone.io/page"],
            ))
            .mock_tiers(
                MockTierClient::new()
                    .with_ok("https://reviews.io/acme", CrawlMethod::Basic, ARTICLE)
                    .with_err("https://gone.io/page", CrawlMethod::Basic, TierError::Status { status: 404 }),
            );
        let executor = QueryExecutor::new(test_deps.deps());
        let item = item("best tools");

        let summary = executor.execute_item(&item).await.unwrap();

        assert_eq!(summary.citations, 2);
        assert_eq!(summary.pages_analyzed, 1);
        assert_eq!(summary.pages_degraded, 1);

        let results = test_deps.results.query_results_for_run(item.run_id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].classification.brand_mentioned);
        assert_eq!(results[0].classification.first_mention_rank, Some(1));

        let pages = test_deps.results.page_analyses_for_result(summary.query_result_id).await.unwrap();
        assert_eq!(pages[0].status, PageAnalysisStatus::Analyzed);
        assert_eq!(pages[0].title.as_deref(), Some("Acme Review"));
        assert_eq!(pages[0].quality.overall, 72);
        assert_eq!(pages[1].status, PageAnalysisStatus::NotFound);
        assert_eq!(pages[1].status_code, Some(404));
        assert!(pages[1].quality.is_fallback);
        assert_eq!(test_deps.tier_client.call_count(CrawlMethod::Premium), 0);
    }

    #[tokio::test]
    async fn test_permanent_dispatch_error_is_non_retryable() {
        let test_deps = TestDependencies::new()
            .mock_dispatcher(MockQueryDispatcher::new().with_failures("q", 1, 400));
        let executor = QueryExecutor::new(test_deps.deps());

        let err = executor.execute(&item("q")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NonRetryable);
    }

    #[tokio::test]
    async fn test_transient_dispatch_error_is_retryable() {
        let test_deps = TestDependencies::new()
            .mock_dispatcher(MockQueryDispatcher::new().with_failures("q", 1, 503));
        let executor = QueryExecutor::new(test_deps.deps());

        let err = executor.execute(&item("q")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Retryable);
    }

    #[tokio::test]
    async fn test_second_execution_reuses_cached_pages() {
        let test_deps = TestDependencies::new()
            .mock_dispatcher(MockQueryDispatcher::new().with_cited_response(
                "q",
                "See the review.",
                &["https://reviews.io/acme"],
            ))
            .mock_tiers(MockTierClient::new().with_ok("https://reviews.io/acme", CrawlMethod::Basic, ARTICLE));
        let executor = QueryExecutor::new(test_deps.deps());

        let first = executor.execute_item(&item("q")).await.unwrap();
        let second = executor.execute_item(&item("q")).await.unwrap();

        assert_eq!(first.credits_spent, 1);
        assert_eq!(second.credits_spent, 0);
        assert_eq!(test_deps.tier_client.total_calls(), 1);
    }
}
