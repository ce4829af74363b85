//! Tiered fetch state machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{cache_key, CacheMode, CacheStore, Cached, ResponseCache};
use crate::content::{extract_title, looks_js_rendered, word_count};
use crate::error::{FetchError, FetchResult, TierError};
use crate::preflight;
use crate::tiers::TierClient;
use crate::types::{CrawlMethod, CrawlResult, FetchOutcome, FetchedPage};

/// Escalation settings.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Pages under this many words that look JS-rendered get a rendering pass.
    pub min_word_count: usize,
    /// Pause between tier attempts on the same URL.
    pub tier_delay: Duration,
    pub enable_js_rendering: bool,
    pub enable_premium: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            min_word_count: 100,
            tier_delay: Duration::from_millis(250),
            enable_js_rendering: true,
            enable_premium: true,
        }
    }
}

/// Fetches a URL through basic → JS rendering / premium tiers.
pub struct TieredFetcher {
    client: Arc<dyn TierClient>,
    config: FetcherConfig,
}

impl TieredFetcher {
    pub fn new(client: Arc<dyn TierClient>) -> Self {
        Self {
            client,
            config: FetcherConfig::default(),
        }
    }

    pub fn with_config(client: Arc<dyn TierClient>, config: FetcherConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch a URL, escalating only when the cheaper tier cannot deliver.
    pub async fn fetch(&self, raw_url: &str) -> FetchResult<FetchOutcome> {
        let url = preflight::check(raw_url).map_err(|reason| {
            debug!(url = %raw_url, reason = %reason, "skipping URL");
            FetchError::Skipped {
                url: raw_url.to_string(),
                reason,
            }
        })?;

        let mut attempts = Vec::new();
        let mut causes = Vec::new();

        match self.attempt(&url, CrawlMethod::Basic, &mut attempts).await {
            Ok(page) => {
                if self.needs_rendering(&page) {
                    return Ok(self.escalate_to_rendering(&url, page, attempts).await);
                }
                Ok(FetchOutcome { page, attempts })
            }
            Err(err) if err.is_not_found() => {
                info!(url = %url, "page not found, not escalating");
                Err(FetchError::NotFound {
                    url: url.to_string(),
                    attempts,
                })
            }
            Err(err) => {
                causes.push((CrawlMethod::Basic, err));
                if !self.can_use(CrawlMethod::Premium) {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts,
                        causes,
                    });
                }

                warn!(
                    url = %url,
                    cause = %causes[0].1,
                    blocked = causes[0].1.is_blocking(),
                    "basic fetch failed, escalating to premium"
                );
                self.pause().await;

                match self.attempt(&url, CrawlMethod::Premium, &mut attempts).await {
                    Ok(page) => Ok(FetchOutcome { page, attempts }),
                    Err(err) => {
                        causes.push((CrawlMethod::Premium, err));
                        Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts,
                            causes,
                        })
                    }
                }
            }
        }
    }

    fn needs_rendering(&self, page: &FetchedPage) -> bool {
        page.word_count < self.config.min_word_count
            && looks_js_rendered(&page.html)
            && self.can_use(CrawlMethod::JsRendering)
    }

    fn can_use(&self, method: CrawlMethod) -> bool {
        let enabled = match method {
            CrawlMethod::JsRendering => self.config.enable_js_rendering,
            CrawlMethod::Premium => self.config.enable_premium,
            _ => true,
        };
        enabled && self.client.supports(method)
    }

    /// A rendering failure keeps the thin basic page rather than paying for
    /// premium: the basic tier already proved the site is reachable.
    async fn escalate_to_rendering(
        &self,
        url: &Url,
        basic: FetchedPage,
        mut attempts: Vec<CrawlResult>,
    ) -> FetchOutcome {
        info!(
            url = %url,
            word_count = basic.word_count,
            "client-rendered shell detected, retrying with JS rendering"
        );
        self.pause().await;

        match self
            .attempt(url, CrawlMethod::JsRendering, &mut attempts)
            .await
        {
            Ok(rendered) => FetchOutcome {
                page: rendered,
                attempts,
            },
            Err(err) => {
                warn!(url = %url, error = %err, "JS rendering failed, keeping basic content");
                FetchOutcome {
                    page: basic,
                    attempts,
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        method: CrawlMethod,
        attempts: &mut Vec<CrawlResult>,
    ) -> Result<FetchedPage, TierError> {
        let started = Instant::now();
        let result = self.client.fetch(url, method).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let words = word_count(&response.html);
                attempts.push(CrawlResult {
                    url: url.to_string(),
                    status_code: Some(response.status_code),
                    method,
                    html_length: response.html.len(),
                    word_count: words,
                    duration_ms,
                    success: true,
                    error: None,
                });
                debug!(url = %url, method = %method, words, duration_ms, "tier succeeded");

                Ok(FetchedPage {
                    url: url.to_string(),
                    final_url: response.final_url.unwrap_or_else(|| url.to_string()),
                    title: extract_title(&response.html),
                    html: response.html,
                    status_code: response.status_code,
                    method,
                    word_count: words,
                    fetched_at: Utc::now(),
                })
            }
            Err(err) => {
                attempts.push(CrawlResult {
                    url: url.to_string(),
                    status_code: err.status_code(),
                    method,
                    html_length: 0,
                    word_count: 0,
                    duration_ms,
                    success: false,
                    error: Some(err.to_string()),
                });
                debug!(url = %url, method = %method, error = %err, "tier failed");
                Err(err)
            }
        }
    }

    async fn pause(&self) {
        if !self.config.tier_delay.is_zero() {
            tokio::time::sleep(self.config.tier_delay).await;
        }
    }
}

/// Tiered fetcher fronted by the response cache.
pub struct PageFetcher {
    fetcher: TieredFetcher,
    cache: ResponseCache,
    ttl: Duration,
}

impl PageFetcher {
    pub fn new(fetcher: TieredFetcher, store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: ResponseCache::new(store),
            ttl,
        }
    }

    /// Fetch through the cache. Only successful fetches are stored; a failed
    /// fetch falls back to a stale entry when one exists.
    pub async fn fetch(&self, raw_url: &str, mode: CacheMode) -> FetchResult<Cached<FetchOutcome>> {
        let key = cache_key(&preflight::normalize_url(raw_url).unwrap_or_else(|| raw_url.to_string()));
        self.cache
            .get_or_fetch(&key, self.ttl, mode, || self.fetcher.fetch(raw_url))
            .await
    }

    pub fn tiered(&self) -> &TieredFetcher {
        &self.fetcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Freshness, MemoryCacheStore};
    use crate::testing::MockTierClient;
    use crate::types::TierResponse;

    const ARTICLE: &str = "<html><head><title>Guide</title></head><body><article>";

    fn article(words: usize) -> String {
        format!("{}{}</article></body></html>", ARTICLE, "word ".repeat(words))
    }

    fn spa_shell() -> String {
        r#"<html><head><script src="/app.js"></script></head><body><div id="root"></div></body></html>"#.to_string()
    }

    fn fast_config() -> FetcherConfig {
        FetcherConfig {
            tier_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_basic_success_does_not_escalate() {
        let client = Arc::new(MockTierClient::new().with_ok(
            "https://acme.io/guide",
            CrawlMethod::Basic,
            &article(300),
        ));
        let fetcher = TieredFetcher::with_config(client.clone(), fast_config());

        let outcome = fetcher.fetch("https://acme.io/guide").await.unwrap();
        assert_eq!(outcome.page.method, CrawlMethod::Basic);
        assert_eq!(outcome.page.title.as_deref(), Some("Guide"));
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(client.call_count(CrawlMethod::JsRendering), 0);
        assert_eq!(client.call_count(CrawlMethod::Premium), 0);
    }

    #[tokio::test]
    async fn test_not_found_never_escalates() {
        let client = Arc::new(MockTierClient::new().with_err(
            "https://acme.io/gone",
            CrawlMethod::Basic,
            TierError::Status { status: 404 },
        ));
        let fetcher = TieredFetcher::with_config(client.clone(), fast_config());

        let err = fetcher.fetch("https://acme.io/gone").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
        assert_eq!(err.attempts().len(), 1);
        assert_eq!(client.call_count(CrawlMethod::Basic), 1);
        assert_eq!(client.call_count(CrawlMethod::JsRendering), 0);
        assert_eq!(client.call_count(CrawlMethod::Premium), 0);
    }

    #[tokio::test]
    async fn test_js_shell_escalates_to_rendering() {
        let client = Arc::new(
            MockTierClient::new()
                .with_ok("https://app.acme.io/", CrawlMethod::Basic, &spa_shell())
                .with_ok("https://app.acme.io/", CrawlMethod::JsRendering, &article(250)),
        );
        let fetcher = TieredFetcher::with_config(client.clone(), fast_config());

        let outcome = fetcher.fetch("https://app.acme.io/").await.unwrap();
        assert_eq!(outcome.page.method, CrawlMethod::JsRendering);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].method, CrawlMethod::Basic);
        assert!(outcome.attempts[0].success);
        assert_eq!(client.call_count(CrawlMethod::Premium), 0);
        assert_eq!(outcome.credits_spent(), 6);
    }

    #[tokio::test]
    async fn test_rendering_failure_keeps_basic_page() {
        let client = Arc::new(
            MockTierClient::new()
                .with_ok("https://app.acme.io/", CrawlMethod::Basic, &spa_shell())
                .with_err(
                    "https://app.acme.io/",
                    CrawlMethod::JsRendering,
                    TierError::Timeout(Duration::from_secs(45)),
                ),
        );
        let fetcher = TieredFetcher::with_config(client.clone(), fast_config());

        let outcome = fetcher.fetch("https://app.acme.io/").await.unwrap();
        assert_eq!(outcome.page.method, CrawlMethod::Basic);
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[1].success);
        assert_eq!(client.call_count(CrawlMethod::Premium), 0);
    }

    #[tokio::test]
    async fn test_thin_static_page_is_accepted() {
        let client = Arc::new(MockTierClient::new().with_ok(
            "https://acme.io/short",
            CrawlMethod::Basic,
            &article(20),
        ));
        let fetcher = TieredFetcher::with_config(client.clone(), fast_config());

        let outcome = fetcher.fetch("https://acme.io/short").await.unwrap();
        assert_eq!(outcome.page.method, CrawlMethod::Basic);
        assert_eq!(client.call_count(CrawlMethod::JsRendering), 0);
    }

    #[tokio::test]
    async fn test_blocked_escalates_to_premium() {
        let client = Arc::new(
            MockTierClient::new()
                .with_err(
                    "https://news.acme.io/story",
                    CrawlMethod::Basic,
                    TierError::Status { status: 403 },
                )
                .with_ok("https://news.acme.io/story", CrawlMethod::Premium, &article(500)),
        );
        let fetcher = TieredFetcher::with_config(client.clone(), fast_config());

        let outcome = fetcher.fetch("https://news.acme.io/story").await.unwrap();
        assert_eq!(outcome.page.method, CrawlMethod::Premium);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].status_code, Some(403));
        assert_eq!(client.call_count(CrawlMethod::JsRendering), 0);
    }

    #[tokio::test]
    async fn test_all_tiers_failing_reports_each_cause() {
        let client = Arc::new(
            MockTierClient::new()
                .with_err(
                    "https://news.acme.io/story",
                    CrawlMethod::Basic,
                    TierError::Status { status: 503 },
                )
                .with_err(
                    "https://news.acme.io/story",
                    CrawlMethod::Premium,
                    TierError::Blocked("captcha challenge".into()),
                ),
        );
        let fetcher = TieredFetcher::with_config(client, fast_config());

        let err = fetcher.fetch("https://news.acme.io/story").await.unwrap_err();
        match &err {
            FetchError::Exhausted { causes, attempts, .. } => {
                assert_eq!(causes.len(), 2);
                assert_eq!(attempts.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("basic: HTTP 503"));
        assert!(message.contains("premium: blocked"));
    }

    #[tokio::test]
    async fn test_premium_disabled_stops_after_basic() {
        let client = Arc::new(MockTierClient::new().with_err(
            "https://news.acme.io/story",
            CrawlMethod::Basic,
            TierError::Status { status: 429 },
        ));
        let config = FetcherConfig {
            enable_premium: false,
            ..fast_config()
        };
        let fetcher = TieredFetcher::with_config(client.clone(), config);

        assert!(fetcher.fetch("https://news.acme.io/story").await.is_err());
        assert_eq!(client.call_count(CrawlMethod::Premium), 0);
    }

    #[tokio::test]
    async fn test_skipped_url_makes_no_request() {
        let client = Arc::new(MockTierClient::new());
        let fetcher = TieredFetcher::with_config(client.clone(), fast_config());

        let err = fetcher.fetch("http://localhost:8080/admin").await.unwrap_err();
        assert!(err.is_skipped());
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_page_fetcher_serves_repeat_from_cache() {
        let client = Arc::new(MockTierClient::new().with_ok(
            "https://acme.io/guide",
            CrawlMethod::Basic,
            &article(300),
        ));
        let fetcher = PageFetcher::new(
            TieredFetcher::with_config(client.clone(), fast_config()),
            Arc::new(MemoryCacheStore::new()),
            Duration::from_secs(3600),
        );

        let first = fetcher
            .fetch("https://acme.io/guide?utm_source=chat", CacheMode::Default)
            .await
            .unwrap();
        assert_eq!(first.freshness, Freshness::Fetched);

        let second = fetcher
            .fetch("https://acme.io/guide", CacheMode::Default)
            .await
            .unwrap();
        assert_eq!(second.freshness, Freshness::Fresh);
        assert_eq!(client.call_count(CrawlMethod::Basic), 1);
    }

    #[tokio::test]
    async fn test_mock_response_shape() {
        let response = TierResponse::ok("<p>x</p>");
        assert_eq!(response.status_code, 200);
    }
}
