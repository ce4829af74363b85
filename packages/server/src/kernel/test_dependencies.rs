// TestDependencies - mock implementations for testing
//
// Provides scripted collaborators and in-memory stores that can be assembled
// into PipelineDeps for tests and the in-memory drain mode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use page_fetch::testing::MockTierClient;
use page_fetch::{FetcherConfig, MemoryCacheStore, PageFetcher, TieredFetcher};

use super::classifier::MentionClassifier;
use super::concurrency::ConcurrencyLimit;
use super::deps::PipelineDeps;
use super::dispatch::{DispatchError, DispatchResponse};
use super::jobs::{MemoryWorkQueue, WorkerInvocation};
use super::traits::{BaseContentScorer, BaseQueryDispatcher, ScoringRequest, WorkerTrigger};
use crate::common::Platform;
use crate::domains::analysis::models::ContentQualityRecord;
use crate::domains::analysis::store::{MemoryResultStore, MemoryRunStore};
use crate::domains::citations::RawCitation;

// =============================================================================
// Mock Query Dispatcher
// =============================================================================

#[derive(Debug, Clone, Default)]
struct DispatchScript {
    /// Calls that fail before the response is returned
    failures_remaining: usize,
    failure_status: u16,
    response: Option<DispatchResponse>,
}

/// Dispatcher returning scripted answers per query text.
#[derive(Clone, Default)]
pub struct MockQueryDispatcher {
    scripts: Arc<Mutex<HashMap<String, DispatchScript>>>,
    default_response: Arc<Mutex<Option<DispatchResponse>>>,
    calls: Arc<Mutex<Vec<(Platform, String)>>>,
}

impl MockQueryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `content`.
    pub fn with_response(self, query: &str, content: &str) -> Self {
        self.with_dispatch_response(query, DispatchResponse::text(content))
    }

    /// Answer `query` with `content` plus native citations.
    pub fn with_cited_response(self, query: &str, content: &str, urls: &[&str]) -> Self {
        let mut response = DispatchResponse::text(content);
        response.raw_citations = urls.iter().map(|u| RawCitation::new(*u)).collect();
        self.with_dispatch_response(query, response)
    }

    pub fn with_dispatch_response(self, query: &str, response: DispatchResponse) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(query.to_string())
            .or_default()
            .response = Some(response);
        self
    }

    /// Fail the next `times` calls for `query` with an HTTP `status`.
    pub fn with_failures(self, query: &str, times: usize, status: u16) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(query.to_string()).or_default();
            script.failures_remaining = times;
            script.failure_status = status;
        }
        self
    }

    /// Answer for any query without a script.
    pub fn with_default(self, content: &str) -> Self {
        *self.default_response.lock().unwrap() = Some(DispatchResponse::text(content));
        self
    }

    pub fn calls(&self) -> Vec<(Platform, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, query: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, q)| q == query)
            .count()
    }
}

#[async_trait]
impl BaseQueryDispatcher for MockQueryDispatcher {
    async fn dispatch(
        &self,
        platform: Platform,
        query_text: &str,
    ) -> Result<DispatchResponse, DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((platform, query_text.to_string()));

        let mut scripts = self.scripts.lock().unwrap();
        if let Some(script) = scripts.get_mut(query_text) {
            if script.failures_remaining > 0 {
                script.failures_remaining -= 1;
                return Err(DispatchError::Status {
                    platform,
                    status: script.failure_status,
                    body: "scripted failure".to_string(),
                });
            }
            if let Some(response) = &script.response {
                return Ok(response.clone());
            }
        }

        Ok(self
            .default_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| DispatchResponse::text("No information available.")))
    }
}

// =============================================================================
// Mock Content Scorer
// =============================================================================

pub struct MockContentScorer {
    record: ContentQualityRecord,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockContentScorer {
    pub fn new() -> Self {
        Self {
            record: ContentQualityRecord {
                relevance: 80,
                depth: 70,
                authority: 60,
                readability: 75,
                overall: 72,
                summary: "Scored by mock".to_string(),
                is_fallback: false,
            },
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_record(mut self, record: ContentQualityRecord) -> Self {
        self.record = record;
        self
    }

    /// URLs scored so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockContentScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseContentScorer for MockContentScorer {
    async fn score(&self, request: &ScoringRequest<'_>) -> ContentQualityRecord {
        self.calls.lock().unwrap().push(request.url.to_string());
        self.record.clone()
    }
}

// =============================================================================
// Recording Trigger
// =============================================================================

/// Records continuations instead of starting them.
#[derive(Clone, Default)]
pub struct RecordingTrigger {
    invocations: Arc<Mutex<Vec<WorkerInvocation>>>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> Vec<WorkerInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

impl WorkerTrigger for RecordingTrigger {
    fn trigger(&self, invocation: WorkerInvocation) {
        self.invocations.lock().unwrap().push(invocation);
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

pub struct TestDependencies {
    pub dispatcher: Arc<MockQueryDispatcher>,
    pub scorer: Arc<MockContentScorer>,
    pub tier_client: MockTierClient,
    pub trigger: Arc<RecordingTrigger>,
    pub queue: Arc<MemoryWorkQueue>,
    pub runs: Arc<MemoryRunStore>,
    pub results: Arc<MemoryResultStore>,
    pub cache: Arc<MemoryCacheStore>,
    pub fetcher_config: FetcherConfig,
    pub cache_ttl: Duration,
    pub max_attempts: i32,
    pub external_concurrency: usize,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            dispatcher: Arc::new(MockQueryDispatcher::new()),
            scorer: Arc::new(MockContentScorer::new()),
            tier_client: MockTierClient::new(),
            trigger: Arc::new(RecordingTrigger::new()),
            queue: Arc::new(MemoryWorkQueue::new()),
            runs: Arc::new(MemoryRunStore::new()),
            results: Arc::new(MemoryResultStore::new()),
            cache: Arc::new(MemoryCacheStore::new()),
            fetcher_config: FetcherConfig {
                tier_delay: Duration::ZERO,
                ..Default::default()
            },
            cache_ttl: Duration::from_secs(24 * 3600),
            max_attempts: 3,
            external_concurrency: 4,
        }
    }

    /// Set a mock dispatcher
    pub fn mock_dispatcher(mut self, dispatcher: MockQueryDispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    /// Set a mock content scorer
    pub fn mock_scorer(mut self, scorer: MockContentScorer) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    /// Set a mock tier client
    pub fn mock_tiers(mut self, client: MockTierClient) -> Self {
        self.tier_client = client;
        self
    }

    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Assemble PipelineDeps backed by the mocks and in-memory stores.
    pub fn deps(&self) -> PipelineDeps {
        let tiered = TieredFetcher::with_config(
            Arc::new(self.tier_client.clone()),
            self.fetcher_config.clone(),
        );
        PipelineDeps::new(
            self.queue.clone(),
            self.runs.clone(),
            self.results.clone(),
            self.dispatcher.clone(),
            self.scorer.clone(),
            Arc::new(MentionClassifier::new()),
            Arc::new(PageFetcher::new(tiered, self.cache.clone(), self.cache_ttl)),
            ConcurrencyLimit::new(self.external_concurrency),
            self.trigger.clone(),
            self.max_attempts,
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
