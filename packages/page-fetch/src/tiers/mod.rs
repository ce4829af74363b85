//! Tier client implementations.
//!
//! - [`ScrapingApiClient`] - scraping API supporting all three tiers
//! - [`DirectHttpClient`] - plain `reqwest`, basic tier only

mod direct;
mod scraping_api;

pub use direct::DirectHttpClient;
pub use scraping_api::ScrapingApiClient;

use async_trait::async_trait;
use url::Url;

use crate::error::TierResult;
use crate::types::{CrawlMethod, TierResponse};

/// Retrieves a URL with the settings of one cost tier.
///
/// Implementations return `Ok` only for 2xx responses; every other status
/// maps to [`TierError::Status`](crate::TierError::Status) so the fetcher
/// can classify it.
#[async_trait]
pub trait TierClient: Send + Sync {
    async fn fetch(&self, url: &Url, method: CrawlMethod) -> TierResult<TierResponse>;

    /// Whether this client can perform the given tier at all.
    fn supports(&self, method: CrawlMethod) -> bool {
        !matches!(method, CrawlMethod::Failed)
    }

    fn name(&self) -> &'static str;
}

pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: std::time::Duration) -> crate::TierError {
    if err.is_timeout() {
        crate::TierError::Timeout(timeout)
    } else if let Some(status) = err.status() {
        crate::TierError::Status {
            status: status.as_u16(),
        }
    } else {
        crate::TierError::Transport(err.to_string())
    }
}
