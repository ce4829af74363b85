//! OpenAI-compatible chat completion dispatcher for every answer platform.
//!
//! ChatGPT, Perplexity and Gemini all expose `/chat/completions`; only the base
//! URL, model, key and a few extra body fields differ.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::common::Platform;
use crate::domains::citations::{native_citations_from_body, RawCitation};
use crate::kernel::traits::BaseQueryDispatcher;

/// Errors from a platform call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No endpoint/key configured for the platform
    #[error("platform {0} is not configured")]
    NotConfigured(Platform),

    /// Connection failure or timeout
    #[error("request to {platform} failed: {message}")]
    Transport { platform: Platform, message: String },

    /// Non-2xx response
    #[error("{platform} returned HTTP {status}: {body}")]
    Status {
        platform: Platform,
        status: u16,
        body: String,
    },

    /// 2xx response without usable answer content
    #[error("malformed response from {platform}: {message}")]
    Malformed { platform: Platform, message: String },
}

impl DispatchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::NotConfigured(_) => false,
            DispatchError::Transport { .. } | DispatchError::Malformed { .. } => true,
            DispatchError::Status { status, .. } => {
                matches!(status, 408 | 409 | 425 | 429) || *status >= 500
            }
        }
    }
}

/// A platform's answer.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub content: String,
    pub raw_citations: Vec<RawCitation>,
    /// Full response body, kept for tool-call citation extraction
    pub raw: Value,
}

impl DispatchResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            raw_citations: Vec::new(),
            raw: Value::Null,
        }
    }
}

/// Connection details for one platform.
#[derive(Debug, Clone)]
pub struct PlatformEndpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Merged into the request body (e.g. `web_search_options`)
    pub extra_body: Value,
}

impl PlatformEndpoint {
    /// Default endpoint for a platform.
    pub fn for_platform(platform: Platform, api_key: impl Into<String>) -> Self {
        let (base_url, model, extra_body) = match platform {
            Platform::ChatGpt => (
                "https://api.openai.com/v1",
                "gpt-4o-search-preview",
                json!({"web_search_options": {}}),
            ),
            Platform::Perplexity => ("https://api.perplexity.ai", "sonar", json!({})),
            Platform::Gemini => (
                "https://generativelanguage.googleapis.com/v1beta/openai",
                "gemini-2.0-flash",
                json!({}),
            ),
        };
        Self {
            base_url: base_url.to_string(),
            api_key: api_key.into(),
            model: model.to_string(),
            extra_body,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Dispatches queries over HTTP with bounded exponential backoff.
#[derive(Clone)]
pub struct ChatCompletionDispatcher {
    http_client: Client,
    endpoints: HashMap<Platform, PlatformEndpoint>,
    max_retries: u32,
    base_backoff: Duration,
}

impl Default for ChatCompletionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request timeout for platform calls.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in a [`DispatchError::Status`], in characters.
const MAX_ERROR_BODY_CHARS: usize = 500;

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

impl ChatCompletionDispatcher {
    pub fn new() -> Self {
        Self {
            http_client: http_client(DEFAULT_DISPATCH_TIMEOUT),
            endpoints: HashMap::new(),
            max_retries: 2,
            base_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = http_client(timeout);
        self
    }

    pub fn with_platform(mut self, platform: Platform, endpoint: PlatformEndpoint) -> Self {
        self.endpoints.insert(platform, endpoint);
        self
    }

    /// Register a platform with its default endpoint when a key is present.
    pub fn with_key(self, platform: Platform, api_key: Option<&str>) -> Self {
        match api_key {
            Some(key) => self.with_platform(platform, PlatformEndpoint::for_platform(platform, key)),
            None => self,
        }
    }

    pub fn with_retry(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_backoff = base_backoff;
        self
    }

    pub fn configured_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.endpoints.contains_key(p))
            .collect()
    }

    async fn send_once(
        &self,
        platform: Platform,
        endpoint: &PlatformEndpoint,
        query_text: &str,
    ) -> Result<DispatchResponse, DispatchError> {
        let mut body = json!({
            "model": endpoint.model,
            "messages": [{"role": "user", "content": query_text}],
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), endpoint.extra_body.as_object()) {
            body.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let response = self
            .http_client
            .post(format!("{}/chat/completions", endpoint.base_url.trim_end_matches('/')))
            .bearer_auth(&endpoint.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport {
                platform,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                platform,
                status: status.as_u16(),
                body: error_text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let raw: Value = response.json().await.map_err(|e| DispatchError::Malformed {
            platform,
            message: e.to_string(),
        })?;

        let content = raw
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| DispatchError::Malformed {
                platform,
                message: "no message content".to_string(),
            })?
            .to_string();

        Ok(DispatchResponse {
            content,
            raw_citations: native_citations_from_body(&raw),
            raw,
        })
    }
}

#[async_trait]
impl BaseQueryDispatcher for ChatCompletionDispatcher {
    async fn dispatch(
        &self,
        platform: Platform,
        query_text: &str,
    ) -> Result<DispatchResponse, DispatchError> {
        let endpoint = self
            .endpoints
            .get(&platform)
            .ok_or(DispatchError::NotConfigured(platform))?;

        let start = std::time::Instant::now();
        let mut retries = 0;
        loop {
            match self.send_once(platform, endpoint, query_text).await {
                Ok(response) => {
                    debug!(
                        platform = %platform,
                        model = %endpoint.model,
                        citations = response.raw_citations.len(),
                        duration_ms = start.elapsed().as_millis(),
                        "platform dispatch"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    let delay = self.base_backoff * 2u32.pow(retries);
                    warn!(platform = %platform, error = %e, retry_in_ms = delay.as_millis(), "dispatch failed, retrying");
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
