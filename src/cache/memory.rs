//! Process-local cache backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::backend::{CacheBackend, CacheEntry};
use crate::cache::key::CacheKey;
use crate::error::Result;

/// Shared in-memory entry map.
///
/// Clones share the same entries, so several caches opened on one store see
/// each other's writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Backend keeping entries in a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryBackend {
    store: MemoryStore,
}

impl MemoryBackend {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let entries = self.store.entries.read().await;
        Ok(entries.get(key.as_str()).cloned())
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.store.entries.write().await;
        entries.insert(key.as_str().to_string(), entry.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.store.entries.write().await.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
