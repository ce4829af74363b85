//! Testing utilities including a scripted tier client.
//!
//! Lets applications exercise the fetch escalation logic without network
//! calls, and assert which tiers were paid for.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use url::Url;

use crate::error::{TierError, TierResult};
use crate::preflight::normalize_url;
use crate::tiers::TierClient;
use crate::types::{CrawlMethod, TierResponse};

/// Record of a call made to the mock client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTierCall {
    pub url: String,
    pub method: CrawlMethod,
}

/// Tier client returning scripted responses per (URL, tier).
///
/// Unscripted combinations fail with a transport error. URLs are matched
/// after normalization, so query strings do not matter.
#[derive(Default, Clone)]
pub struct MockTierClient {
    responses: Arc<RwLock<HashMap<(String, CrawlMethod), TierResult<TierResponse>>>>,
    fallback: Arc<RwLock<Option<TierResult<TierResponse>>>>,
    calls: Arc<RwLock<Vec<MockTierCall>>>,
}

impl MockTierClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(url: &str) -> String {
        normalize_url(url).unwrap_or_else(|| url.to_string())
    }

    /// Script a successful response.
    pub fn with_ok(self, url: &str, method: CrawlMethod, html: &str) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert((Self::key(url), method), Ok(TierResponse::ok(html)));
        self
    }

    /// Script a failure.
    pub fn with_err(self, url: &str, method: CrawlMethod, err: TierError) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert((Self::key(url), method), Err(err));
        self
    }

    /// Response for any URL/tier that was not scripted.
    pub fn with_fallback(self, response: TierResult<TierResponse>) -> Self {
        *self.fallback.write().unwrap() = Some(response);
        self
    }

    pub fn calls(&self) -> Vec<MockTierCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self, method: CrawlMethod) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl TierClient for MockTierClient {
    async fn fetch(&self, url: &Url, method: CrawlMethod) -> TierResult<TierResponse> {
        self.calls.write().unwrap().push(MockTierCall {
            url: url.to_string(),
            method,
        });

        let key = (Self::key(url.as_str()), method);
        if let Some(scripted) = self.responses.read().unwrap().get(&key) {
            return scripted.clone();
        }
        match self.fallback.read().unwrap().as_ref() {
            Some(response) => response.clone(),
            None => Err(TierError::Transport(format!(
                "no mock response for {} ({})",
                url, method
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
