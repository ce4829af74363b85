//! Pipeline dependencies (using traits for testability)
//!
//! The central container handed to the query executor, the worker and the
//! HTTP routes. All external services are trait objects so tests can swap in
//! the mocks from [`super::test_dependencies`].

use std::sync::Arc;

use anyhow::{Context, Result};
use page_fetch::{
    DirectHttpClient, FetcherConfig, PageFetcher, PostgresCacheStore, ScrapingApiClient,
    TierClient, TieredFetcher,
};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::common::Platform;
use crate::config::Config;
use crate::domains::analysis::store::{
    PostgresResultStore, PostgresRunStore, ResultStore, RunStore,
};
use crate::kernel::classifier::MentionClassifier;
use crate::kernel::concurrency::ConcurrencyLimit;
use crate::kernel::dispatch::ChatCompletionDispatcher;
use crate::kernel::jobs::{PostgresWorkQueue, WorkQueue};
use crate::kernel::scoring::{LlmContentScorer, NoopContentScorer};
use crate::kernel::traits::{
    BaseContentScorer, BaseQueryDispatcher, BaseResponseClassifier, WorkerTrigger,
};

// =============================================================================
// PipelineDeps
// =============================================================================

/// Dependencies shared by every stage of the citation pipeline
#[derive(Clone)]
pub struct PipelineDeps {
    // Storage
    pub queue: Arc<dyn WorkQueue>,
    pub runs: Arc<dyn RunStore>,
    pub results: Arc<dyn ResultStore>,

    // External collaborators
    pub dispatcher: Arc<dyn BaseQueryDispatcher>,
    pub scorer: Arc<dyn BaseContentScorer>,
    pub classifier: Arc<dyn BaseResponseClassifier>,
    pub fetcher: Arc<PageFetcher>,

    /// Shared cap on in-flight external calls
    pub limit: ConcurrencyLimit,
    pub trigger: Arc<dyn WorkerTrigger>,
    /// Attempts each enqueued item gets before it is failed
    pub max_attempts: i32,
}

impl PipelineDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        runs: Arc<dyn RunStore>,
        results: Arc<dyn ResultStore>,
        dispatcher: Arc<dyn BaseQueryDispatcher>,
        scorer: Arc<dyn BaseContentScorer>,
        classifier: Arc<dyn BaseResponseClassifier>,
        fetcher: Arc<PageFetcher>,
        limit: ConcurrencyLimit,
        trigger: Arc<dyn WorkerTrigger>,
        max_attempts: i32,
    ) -> Self {
        Self {
            queue,
            runs,
            results,
            dispatcher,
            scorer,
            classifier,
            fetcher,
            limit,
            trigger,
            max_attempts,
        }
    }

    /// Same dependencies with a different continuation trigger.
    pub fn with_trigger(mut self, trigger: Arc<dyn WorkerTrigger>) -> Self {
        self.trigger = trigger;
        self
    }

    /// Production dependencies: Postgres stores and cache, HTTP collaborators
    /// configured from the environment.
    pub fn from_config(
        config: &Config,
        pool: PgPool,
        trigger: Arc<dyn WorkerTrigger>,
    ) -> Result<Self> {
        let dispatcher = ChatCompletionDispatcher::new()
            .with_timeout(config.dispatch_timeout)
            .with_key(Platform::ChatGpt, config.openai_api_key.as_deref())
            .with_key(Platform::Perplexity, config.perplexity_api_key.as_deref())
            .with_key(Platform::Gemini, config.gemini_api_key.as_deref());
        let platforms = dispatcher.configured_platforms();
        if platforms.is_empty() {
            warn!("no platform API keys configured, every dispatch will fail");
        } else {
            info!(?platforms, "platform dispatch configured");
        }

        let scorer: Arc<dyn BaseContentScorer> = match &config.openai_api_key {
            Some(key) => {
                Arc::new(LlmContentScorer::new(key.clone()).with_timeout(config.scoring_timeout))
            }
            None => {
                warn!("OPENAI_API_KEY not set, pages get the fallback quality record");
                Arc::new(NoopContentScorer)
            }
        };

        // Scraping API when a key exists, otherwise plain HTTP (basic tier only)
        let (tier_client, fetcher_config): (Arc<dyn TierClient>, FetcherConfig) =
            match &config.scraping_api_key {
                Some(key) => (
                    Arc::new(
                        ScrapingApiClient::new(key.clone())
                            .context("failed to build scraping API client")?,
                    ),
                    FetcherConfig::default(),
                ),
                None => {
                    warn!("SCRAPING_API_KEY not set, falling back to direct HTTP");
                    (
                        Arc::new(
                            DirectHttpClient::new().context("failed to build HTTP client")?,
                        ),
                        FetcherConfig {
                            enable_js_rendering: false,
                            enable_premium: false,
                            ..Default::default()
                        },
                    )
                }
            };
        let tiered = TieredFetcher::with_config(tier_client, fetcher_config);
        let fetcher = PageFetcher::new(
            tiered,
            Arc::new(PostgresCacheStore::new(pool.clone())),
            config.cache_ttl,
        );

        Ok(Self::new(
            Arc::new(PostgresWorkQueue::new(pool.clone())),
            Arc::new(PostgresRunStore::new(pool.clone())),
            Arc::new(PostgresResultStore::new(pool)),
            Arc::new(dispatcher),
            scorer,
            Arc::new(MentionClassifier::new()),
            Arc::new(fetcher),
            ConcurrencyLimit::new(config.external_concurrency),
            trigger,
            config.max_attempts,
        ))
    }
}
