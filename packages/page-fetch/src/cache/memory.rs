//! In-memory cache store for testing and single-process use.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{CacheEntry, CacheStore};
use crate::error::CacheResult;

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> CacheResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }
}
