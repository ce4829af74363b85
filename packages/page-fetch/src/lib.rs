//! Cost-aware page fetching.
//!
//! Retrieves cited pages at the lowest cost that still yields usable content,
//! escalating through increasingly expensive tiers only when the cheaper one
//! is blocked or returns a client-rendered shell.
//!
//! # Tiers
//!
//! ```text
//! preflight ──skip──► FetchError::Skipped (no network call)
//!     │
//!     ▼
//! Basic ──ok, JS shell + thin content──► JsRendering ──fail──► keep Basic page
//!     │
//!     ├──404──► FetchError::NotFound (terminal, never escalates)
//!     │
//!     └──blocked / other failure──► Premium ──fail──► FetchError::Exhausted
//! ```
//!
//! Every attempt is recorded as a [`CrawlResult`] so callers can audit the
//! cost incurred for each URL.
//!
//! # Modules
//!
//! - [`preflight`] - URL skip rules applied before any request
//! - [`content`] - HTML inspection (word count, JS shell and captcha detection, markdown)
//! - [`tiers`] - Tier client implementations (scraping API, direct HTTP)
//! - [`fetcher`] - The escalation state machine
//! - [`cache`] - URL-hash keyed response cache with stale fallback
//! - [`testing`] - Mock tier client for tests

pub mod cache;
pub mod content;
pub mod error;
pub mod fetcher;
pub mod preflight;
pub mod testing;
pub mod tiers;
pub mod types;

pub use cache::{
    cache_key, CacheEntry, CacheMode, CacheStore, Cached, Freshness, MemoryCacheStore,
    ResponseCache,
};
pub use error::{CacheError, FetchError, SkipReason, TierError};
pub use fetcher::{FetcherConfig, PageFetcher, TieredFetcher};
pub use preflight::{domain_of, normalize_url};
pub use tiers::{DirectHttpClient, ScrapingApiClient, TierClient};
pub use types::{CrawlMethod, CrawlResult, FetchOutcome, FetchedPage, TierResponse};

#[cfg(feature = "postgres")]
pub use cache::PostgresCacheStore;
