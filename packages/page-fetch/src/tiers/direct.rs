//! Direct HTTP client for the basic tier.
//!
//! Used when no scraping API key is configured: free, but no rendering and
//! no proxy rotation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{map_reqwest_error, TierClient};
use crate::content::looks_like_captcha;
use crate::error::{TierError, TierResult};
use crate::types::{CrawlMethod, TierResponse};

pub struct DirectHttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl DirectHttpClient {
    pub fn new() -> TierResult<Self> {
        let timeout = Duration::from_secs(20);
        // Browser-like User-Agent to avoid naive bot detection
        let user_agent = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| TierError::Transport(e.to_string()))?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl TierClient for DirectHttpClient {
    async fn fetch(&self, url: &Url, method: CrawlMethod) -> TierResult<TierResponse> {
        if !self.supports(method) {
            return Err(TierError::Unsupported(method));
        }

        debug!(url = %url, "direct HTTP request");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(TierError::Status { status });
        }
        let final_url = response.url().to_string();

        let html = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        if looks_like_captcha(&html) {
            return Err(TierError::Blocked("captcha challenge".into()));
        }

        Ok(TierResponse {
            status_code: status,
            html,
            final_url: Some(final_url),
        })
    }

    fn supports(&self, method: CrawlMethod) -> bool {
        method == CrawlMethod::Basic
    }

    fn name(&self) -> &'static str {
        "direct-http"
    }
}
