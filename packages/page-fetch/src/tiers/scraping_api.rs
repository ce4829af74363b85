//! Scraping API client.
//!
//! Speaks the common scraping-API dialect (`render_js`, `premium_proxy`,
//! `block_resources` query switches) so each tier is one request with
//! different flags.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{map_reqwest_error, TierClient};
use crate::content::looks_like_captcha;
use crate::error::{TierError, TierResult};
use crate::types::{CrawlMethod, TierResponse};

const DEFAULT_API_URL: &str = "https://app.scrapingbee.com/api/v1/";

/// Header carrying the target site's own status code.
const INITIAL_STATUS_HEADER: &str = "spb-initial-status-code";
const RESOLVED_URL_HEADER: &str = "spb-resolved-url";

pub struct ScrapingApiClient {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    basic_timeout: Duration,
    render_timeout: Duration,
}

impl ScrapingApiClient {
    pub fn new(api_key: impl Into<String>) -> TierResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TierError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            basic_timeout: Duration::from_secs(20),
            render_timeout: Duration::from_secs(45),
        })
    }

    /// Point at a different API endpoint (tests, self-hosted gateways).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeouts(mut self, basic: Duration, render: Duration) -> Self {
        self.basic_timeout = basic;
        self.render_timeout = render;
        self
    }

    fn timeout_for(&self, method: CrawlMethod) -> Duration {
        if method.renders_js() {
            self.render_timeout
        } else {
            self.basic_timeout
        }
    }

    fn flag(value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }
}

#[async_trait]
impl TierClient for ScrapingApiClient {
    async fn fetch(&self, url: &Url, method: CrawlMethod) -> TierResult<TierResponse> {
        if !self.supports(method) {
            return Err(TierError::Unsupported(method));
        }
        let timeout = self.timeout_for(method);

        debug!(url = %url, method = %method, "scraping API request");
        let response = self
            .client
            .get(&self.api_url)
            .timeout(timeout)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("url", url.as_str()),
                ("render_js", Self::flag(method.renders_js())),
                ("premium_proxy", Self::flag(method.uses_premium_proxy())),
                ("block_resources", Self::flag(!method.renders_js())),
            ])
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let api_status = response.status().as_u16();
        let target_status = response
            .headers()
            .get(INITIAL_STATUS_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u16>().ok());
        let final_url = response
            .headers()
            .get(RESOLVED_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let status = match target_status {
            Some(code) if !(200..300).contains(&code) => code,
            _ => api_status,
        };
        if !(200..300).contains(&status) {
            return Err(TierError::Status { status });
        }

        let html = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        if looks_like_captcha(&html) {
            return Err(TierError::Blocked("captcha challenge".into()));
        }

        Ok(TierResponse {
            status_code: status,
            html,
            final_url,
        })
    }

    fn name(&self) -> &'static str {
        "scraping-api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ScrapingApiClient {
        ScrapingApiClient::new("test-key")
            .unwrap()
            .with_api_url(format!("{}/api/v1/", server.uri()))
    }

    #[tokio::test]
    async fn test_basic_tier_sends_cheap_flags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("render_js", "false"))
            .and(query_param("premium_proxy", "false"))
            .and(query_param("block_resources", "true"))
            .and(query_param("api_key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>ok</body></html>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse("https://acme.io/pricing").unwrap();
        let response = client_for(&server)
            .fetch(&url, CrawlMethod::Basic)
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.html.contains("ok"));
    }

    #[tokio::test]
    async fn test_premium_tier_flags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("render_js", "true"))
            .and(query_param("premium_proxy", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>rendered</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse("https://acme.io/pricing").unwrap();
        let response = client_for(&server)
            .fetch(&url, CrawlMethod::Premium)
            .await
            .unwrap();
        assert!(response.html.contains("rendered"));
    }

    #[tokio::test]
    async fn test_target_status_header_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(INITIAL_STATUS_HEADER, "404")
                    .set_body_string("gone"),
            )
            .mount(&server)
            .await;

        let url = Url::parse("https://acme.io/old").unwrap();
        let err = client_for(&server)
            .fetch(&url, CrawlMethod::Basic)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_forbidden_is_blocking() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let url = Url::parse("https://acme.io/").unwrap();
        let err = client_for(&server)
            .fetch(&url, CrawlMethod::Basic)
            .await
            .unwrap_err();
        assert!(err.is_blocking());
    }

    #[tokio::test]
    async fn test_captcha_body_is_blocking() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><h1>Are you a robot?</h1><div class="g-recaptcha"></div></body></html>"#,
            ))
            .mount(&server)
            .await;

        let url = Url::parse("https://acme.io/").unwrap();
        let err = client_for(&server)
            .fetch(&url, CrawlMethod::Basic)
            .await
            .unwrap_err();
        assert!(matches!(err, TierError::Blocked(_)));
    }
}
