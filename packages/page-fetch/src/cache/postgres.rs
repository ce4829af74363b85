//! PostgreSQL cache store.
//!
//! Expects a `page_cache (key TEXT PRIMARY KEY, value JSONB, stored_at TIMESTAMPTZ)` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CacheEntry, CacheStore};
use crate::error::{CacheError, CacheResult};

pub struct PostgresCacheStore {
    pool: PgPool,
}

impl PostgresCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PostgresCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, (String, serde_json::Value, DateTime<Utc>)>(
            "SELECT key, value, stored_at FROM page_cache WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CacheError::Storage(Box::new(e)))?;

        Ok(row.map(|(key, value, stored_at)| CacheEntry {
            key,
            value,
            stored_at,
        }))
    }

    async fn put(&self, entry: &CacheEntry) -> CacheResult<()> {
        sqlx::query(
            r#"
            INSERT INTO page_cache (key, value, stored_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                stored_at = EXCLUDED.stored_at
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.value)
        .bind(entry.stored_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Storage(Box::new(e)))?;

        Ok(())
    }
}
