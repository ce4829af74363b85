//! Typed errors for page fetching.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on the failure class.

use std::time::Duration;

use thiserror::Error;

use crate::types::{CrawlMethod, CrawlResult};

/// Why a URL was rejected before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("URL could not be parsed")]
    InvalidUrl,

    #[error("only http and https URLs are fetched")]
    UnsupportedScheme,

    #[error("local or private host")]
    LocalHost,

    #[error("test or placeholder domain")]
    TestDomain,

    #[error("path looks like an error page")]
    NotFoundPath,

    #[error("search engine results page")]
    SearchResultsPage,

    #[error("not an HTML document")]
    NonHtmlExtension,
}

/// Failure of a single tier attempt.
#[derive(Debug, Clone, Error)]
pub enum TierError {
    /// Target (or scraping API) answered with a non-success status.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// Anti-bot page or explicit captcha challenge.
    #[error("blocked: {0}")]
    Blocked(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0} tier not supported by this client")]
    Unsupported(CrawlMethod),
}

impl TierError {
    /// 404/410 never escalate: a missing page stays missing at any price.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TierError::Status { status: 404 | 410 })
    }

    /// Access-control or rate-limit responses that a premium proxy can get past.
    pub fn is_blocking(&self) -> bool {
        match self {
            TierError::Status { status } => matches!(status, 401 | 403 | 407 | 429),
            TierError::Blocked(_) => true,
            _ => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            TierError::Status { status } => Some(*status),
            _ => None,
        }
    }
}

/// Outcome of a full fetch that produced no usable page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("skipped {url}: {reason}")]
    Skipped { url: String, reason: SkipReason },

    #[error("not found: {url}")]
    NotFound {
        url: String,
        attempts: Vec<CrawlResult>,
    },

    #[error("all tiers failed for {url}: {}", format_causes(.causes))]
    Exhausted {
        url: String,
        attempts: Vec<CrawlResult>,
        causes: Vec<(CrawlMethod, TierError)>,
    },
}

impl FetchError {
    /// Attempts made before giving up (empty for skipped URLs).
    pub fn attempts(&self) -> &[CrawlResult] {
        match self {
            FetchError::Skipped { .. } => &[],
            FetchError::NotFound { attempts, .. } | FetchError::Exhausted { attempts, .. } => {
                attempts
            }
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FetchError::Skipped { .. })
    }
}

fn format_causes(causes: &[(CrawlMethod, TierError)]) -> String {
    causes
        .iter()
        .map(|(method, err)| format!("{method}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Cache backend failures. Readers treat these as misses.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Result type alias for tier attempts.
pub type TierResult<T> = std::result::Result<T, TierError>;

/// Result type alias for fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(TierError::Status { status: 404 }.is_not_found());
        assert!(TierError::Status { status: 410 }.is_not_found());
        assert!(!TierError::Status { status: 403 }.is_not_found());
        assert!(!TierError::Timeout(Duration::from_secs(1)).is_not_found());
    }

    #[test]
    fn test_blocking_classification() {
        assert!(TierError::Status { status: 403 }.is_blocking());
        assert!(TierError::Status { status: 429 }.is_blocking());
        assert!(TierError::Blocked("captcha".into()).is_blocking());
        assert!(!TierError::Status { status: 500 }.is_blocking());
        assert!(!TierError::Transport("reset".into()).is_blocking());
    }

    #[test]
    fn test_exhausted_lists_every_tier() {
        let err = FetchError::Exhausted {
            url: "https://example.org/a".into(),
            attempts: vec![],
            causes: vec![
                (CrawlMethod::Basic, TierError::Status { status: 403 }),
                (CrawlMethod::Premium, TierError::Timeout(Duration::from_secs(30))),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("basic: HTTP 403"));
        assert!(message.contains("premium: timed out"));
    }
}
