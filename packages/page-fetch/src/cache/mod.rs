//! Response cache keyed by URL hash.
//!
//! Entries carry their `stored_at` time; freshness is decided at read time
//! against the caller's TTL. Stale entries are kept so a failed refetch can
//! still serve the last good value.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryCacheStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCacheStore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CacheResult;

/// Stored cache value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Fresh while younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.stored_at).to_std() {
            Ok(age) => age < ttl,
            // Stored "in the future" (clock skew): treat as fresh
            Err(_) => true,
        }
    }
}

/// Storage backend for cache entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Insert or replace.
    async fn put(&self, entry: &CacheEntry) -> CacheResult<()>;
}

/// Whether to consult the cache before fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    /// Always fetch, but still store the result and fall back to any
    /// existing entry on failure.
    Bypass,
}

/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Served from cache within TTL.
    Fresh,
    /// Fetched just now.
    Fetched,
    /// Fetch failed; served an expired entry.
    Stale,
}

#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub freshness: Freshness,
    pub stored_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    pub fn is_degraded(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}

/// Cache key for a normalized URL.
pub fn cache_key(normalized_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Read-through cache with stale fallback.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Return a fresh cached value, or fetch and store a new one. When the
    /// fetch fails and any previous value exists, that value is returned as
    /// [`Freshness::Stale`] instead of the error.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        mode: CacheMode,
        fetch: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let existing = self.read(key).await;

        if mode == CacheMode::Default {
            if let Some((entry, value)) = &existing {
                if entry.is_fresh(ttl, Utc::now()) {
                    debug!(key = %key, "cache hit");
                    if let Ok(value) = serde_json::from_value::<T>(value.clone()) {
                        return Ok(Cached {
                            value,
                            freshness: Freshness::Fresh,
                            stored_at: entry.stored_at,
                        });
                    }
                }
            }
        }

        match fetch().await {
            Ok(value) => {
                let stored_at = Utc::now();
                self.write(key, &value, stored_at).await;
                Ok(Cached {
                    value,
                    freshness: Freshness::Fetched,
                    stored_at,
                })
            }
            Err(err) => {
                let fallback = existing.and_then(|(entry, value)| {
                    serde_json::from_value::<T>(value)
                        .ok()
                        .map(|v| (v, entry.stored_at))
                });
                match fallback {
                    Some((value, stored_at)) => {
                        warn!(key = %key, error = %err, stored_at = %stored_at, "fetch failed, serving stale cache entry");
                        Ok(Cached {
                            value,
                            freshness: Freshness::Stale,
                            stored_at,
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }

    async fn read(&self, key: &str) -> Option<(CacheEntry, serde_json::Value)> {
        match self.store.get(key).await {
            Ok(Some(entry)) => {
                let value = entry.value.clone();
                Some((entry, value))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T, stored_at: DateTime<Utc>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "cache value not serializable");
                return;
            }
        };
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            stored_at,
        };
        if let Err(e) = self.store.put(&entry).await {
            warn!(key = %key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (ResponseCache, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        (ResponseCache::new(store.clone()), store)
    }

    #[test]
    fn test_cache_key_is_stable_hex() {
        let a = cache_key("https://acme.io/pricing");
        assert_eq!(a, cache_key("https://acme.io/pricing"));
        assert_ne!(a, cache_key("https://acme.io/about"));
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_fetch() {
        let (cache, _) = cache();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        for _ in 0..3 {
            let got: Cached<String> = cache
                .get_or_fetch("k", ttl, CacheMode::Default, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("page".to_string())
                })
                .await
                .unwrap();
            assert_eq!(got.value, "page");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_value_served_when_fetch_fails() {
        let (cache, _) = cache();
        cache
            .get_or_fetch("k", Duration::from_secs(60), CacheMode::Default, || async {
                Ok::<_, String>("v1".to_string())
            })
            .await
            .unwrap();

        // A zero TTL expires the entry immediately
        let got: Cached<String> = cache
            .get_or_fetch("k", Duration::ZERO, CacheMode::Default, || async {
                Err::<String, _>("upstream down".to_string())
            })
            .await
            .unwrap();
        assert_eq!(got.value, "v1");
        assert_eq!(got.freshness, Freshness::Stale);
        assert!(got.is_degraded());
    }

    #[tokio::test]
    async fn test_error_propagates_without_entry() {
        let (cache, _) = cache();
        let result: Result<Cached<String>, String> = cache
            .get_or_fetch("missing", Duration::from_secs(60), CacheMode::Default, || async {
                Err("upstream down".to_string())
            })
            .await;
        assert_eq!(result.unwrap_err(), "upstream down");
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let (cache, store) = cache();
        cache
            .get_or_fetch("k", Duration::from_secs(60), CacheMode::Default, || async {
                Ok::<_, String>("v1".to_string())
            })
            .await
            .unwrap();

        let got: Cached<String> = cache
            .get_or_fetch("k", Duration::ZERO, CacheMode::Default, || async {
                Ok::<_, String>("v2".to_string())
            })
            .await
            .unwrap();
        assert_eq!(got.freshness, Freshness::Fetched);
        assert_eq!(
            store.get("k").await.unwrap().unwrap().value,
            serde_json::json!("v2")
        );
    }

    #[tokio::test]
    async fn test_bypass_fetches_and_updates() {
        let (cache, store) = cache();
        let ttl = Duration::from_secs(60);
        cache
            .get_or_fetch("k", ttl, CacheMode::Default, || async {
                Ok::<_, String>("v1".to_string())
            })
            .await
            .unwrap();

        let got: Cached<String> = cache
            .get_or_fetch("k", ttl, CacheMode::Bypass, || async {
                Ok::<_, String>("v2".to_string())
            })
            .await
            .unwrap();
        assert_eq!(got.value, "v2");
        assert_eq!(got.freshness, Freshness::Fetched);
        assert_eq!(
            store.get("k").await.unwrap().unwrap().value,
            serde_json::json!("v2")
        );
    }

    #[test]
    fn test_entry_freshness_window() {
        let now = Utc::now();
        let entry = CacheEntry {
            key: "k".into(),
            value: serde_json::Value::Null,
            stored_at: now - chrono::Duration::seconds(120),
        };
        assert!(entry.is_fresh(Duration::from_secs(300), now));
        assert!(!entry.is_fresh(Duration::from_secs(60), now));
    }
}
