//! Fetch data types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a page was (or failed to be) retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMethod {
    /// No JS rendering, no premium proxy, resource blocking on.
    Basic,
    /// Headless rendering through the standard proxy pool.
    JsRendering,
    /// Premium (residential) proxy with rendering.
    Premium,
    Failed,
}

impl CrawlMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlMethod::Basic => "basic",
            CrawlMethod::JsRendering => "js_rendering",
            CrawlMethod::Premium => "premium",
            CrawlMethod::Failed => "failed",
        }
    }

    /// Relative credit cost of one request at this tier.
    pub fn credit_cost(&self) -> u32 {
        match self {
            CrawlMethod::Basic => 1,
            CrawlMethod::JsRendering => 5,
            CrawlMethod::Premium => 25,
            CrawlMethod::Failed => 0,
        }
    }

    pub fn renders_js(&self) -> bool {
        matches!(self, CrawlMethod::JsRendering | CrawlMethod::Premium)
    }

    pub fn uses_premium_proxy(&self) -> bool {
        matches!(self, CrawlMethod::Premium)
    }
}

impl fmt::Display for CrawlMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one tier attempt. Never mutated after creation; escalation
/// appends a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub status_code: Option<u16>,
    pub method: CrawlMethod,
    pub html_length: usize,
    pub word_count: usize,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Raw response from a tier client.
#[derive(Debug, Clone)]
pub struct TierResponse {
    pub status_code: u16,
    pub html: String,
    /// URL after redirects, when the client knows it.
    pub final_url: Option<String>,
}

impl TierResponse {
    pub fn ok(html: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            html: html.into(),
            final_url: None,
        }
    }
}

/// A successfully retrieved page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub final_url: String,
    pub html: String,
    pub title: Option<String>,
    pub status_code: u16,
    pub method: CrawlMethod,
    pub word_count: usize,
    pub fetched_at: DateTime<Utc>,
}

/// Successful fetch plus the audit trail of every tier tried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub page: FetchedPage,
    pub attempts: Vec<CrawlResult>,
}

impl FetchOutcome {
    /// Total credits spent across all attempts.
    pub fn credits_spent(&self) -> u32 {
        self.attempts.iter().map(|a| a.method.credit_cost()).sum()
    }
}
