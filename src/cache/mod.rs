//! Seed-scoped response caching.
//!
//! A [`ResponseCache`] memoizes inference responses under a [`CacheKey`]
//! derived from a [`CacheSeed`] and the normalized request. The same seed and
//! an equivalent request always map to the same key, so a stored response is
//! returned instead of calling the endpoint again. Entries never expire;
//! switching to a new seed is how callers invalidate them.
//!
//! # Backends
//!
//! The store is chosen explicitly through [`CacheBackendKind`]:
//!
//! - **Disk**: one JSON file per entry under a root directory
//! - **Remote**: an HTTP key-value service addressed by URL (`remote` feature)
//! - **Memory**: a process-local [`MemoryStore`]
//!
//! All of them implement [`CacheBackend`] and behave the same to callers.
//!
//! # Scope
//!
//! [`ResponseCache::open`] acquires the backend and [`ResponseCache::close`]
//! releases it, reporting any release error. Dropping an open cache releases
//! it as well. [`ResponseCache::scoped`] wraps both around a closure:
//!
//! ```rust
//! use llmconf::cache::{CacheConfig, MemoryStore, ResponseCache};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> llmconf::Result<()> {
//! let config = CacheConfig::memory(41u64, MemoryStore::new());
//! let answer = ResponseCache::scoped(config, |cache| {
//!     Box::pin(async move {
//!         let key = cache.key_for(&json!({"model": "gpt-4", "prompt": "2+2"})).unwrap();
//!         cache.put(&key, json!("4")).await?;
//!         cache.get(&key).await
//!     })
//! })
//! .await?;
//! assert_eq!(answer, Some(json!("4")));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod disk;
pub mod key;
pub mod memory;
#[cfg(feature = "remote")]
pub mod remote;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use derive_builder::Builder;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::source::{Environment, ProcessEnv};
use crate::error::{Error, Result};

pub use backend::{CacheBackend, CacheEntry};
pub use disk::DiskBackend;
pub use key::{CacheKey, CacheSeed, DEFAULT_CACHE_SEED, canonical_json};
pub use memory::{MemoryBackend, MemoryStore};
#[cfg(feature = "remote")]
pub use remote::RemoteBackend;

/// Default root directory of the disk backend.
pub const DEFAULT_CACHE_ROOT: &str = ".cache/llmconf";

/// Variable holding the cache seed for [`CacheConfig::from_env`].
pub const CACHE_SEED_VAR: &str = "LLMCONF_CACHE_SEED";
/// Variable holding the disk cache root for [`CacheConfig::from_env`].
pub const CACHE_DIR_VAR: &str = "LLMCONF_CACHE_DIR";
/// Variable holding the remote cache URL for [`CacheConfig::from_env`].
pub const CACHE_URL_VAR: &str = "LLMCONF_CACHE_URL";

/// Which store backs a cache.
#[derive(Debug, Clone)]
pub enum CacheBackendKind {
    /// Local persistent store rooted at a directory.
    Disk { root: PathBuf },
    /// Networked store addressed by URL.
    Remote { url: String },
    /// Process-local store.
    Memory(MemoryStore),
}

impl Default for CacheBackendKind {
    fn default() -> Self {
        CacheBackendKind::Disk {
            root: PathBuf::from(DEFAULT_CACHE_ROOT),
        }
    }
}

/// How to open a [`ResponseCache`].
#[derive(Debug, Clone, Default, Builder)]
#[builder(pattern = "owned", setter(into), build_fn(error = "Error"))]
pub struct CacheConfig {
    /// Seed scoping every key. [`CacheSeed::Disabled`] turns caching off.
    #[builder(default)]
    pub seed: CacheSeed,

    /// The backing store.
    #[builder(default)]
    pub backend: CacheBackendKind,
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Disk cache under `root`.
    pub fn disk(seed: impl Into<CacheSeed>, root: impl Into<PathBuf>) -> Self {
        Self {
            seed: seed.into(),
            backend: CacheBackendKind::Disk { root: root.into() },
        }
    }

    /// Remote cache at `url`.
    pub fn remote(seed: impl Into<CacheSeed>, url: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            backend: CacheBackendKind::Remote { url: url.into() },
        }
    }

    /// In-memory cache on `store`.
    pub fn memory(seed: impl Into<CacheSeed>, store: MemoryStore) -> Self {
        Self {
            seed: seed.into(),
            backend: CacheBackendKind::Memory(store),
        }
    }

    /// Caching turned off.
    pub fn disabled() -> Self {
        Self {
            seed: CacheSeed::Disabled,
            backend: CacheBackendKind::default(),
        }
    }

    /// Read the cache settings from the process environment.
    ///
    /// See [`CacheConfig::from_environment`].
    pub fn from_env() -> Result<Self> {
        Self::from_environment(&ProcessEnv)
    }

    /// Read the cache settings from `env`.
    ///
    /// `LLMCONF_CACHE_SEED` sets the seed (`none` disables caching),
    /// `LLMCONF_CACHE_URL` selects the remote backend and takes precedence
    /// over `LLMCONF_CACHE_DIR`, which selects the disk root. Unset variables
    /// keep the defaults.
    pub fn from_environment(env: &dyn Environment) -> Result<Self> {
        let seed = match env.var(CACHE_SEED_VAR) {
            Some(value) => value.parse()?,
            None => CacheSeed::default(),
        };

        let backend = if let Some(url) = env.var(CACHE_URL_VAR) {
            CacheBackendKind::Remote { url }
        } else if let Some(root) = env.var(CACHE_DIR_VAR) {
            CacheBackendKind::Disk {
                root: PathBuf::from(root),
            }
        } else {
            CacheBackendKind::default()
        };

        Ok(Self { seed, backend })
    }
}

/// Counters for one open cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries written.
    pub writes: u64,
}

/// An open response cache.
///
/// Safe to share between tasks; every method takes `&self` except
/// [`ResponseCache::close`].
#[derive(Debug)]
pub struct ResponseCache {
    seed: CacheSeed,
    backend: Option<Box<dyn CacheBackend>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl ResponseCache {
    /// Acquire the backend described by `config`.
    ///
    /// With a disabled seed no backend is opened at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened, for example when the
    /// disk root cannot be created or the remote URL is invalid.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        let backend = match config.seed {
            CacheSeed::Disabled => {
                log::debug!("response cache disabled");
                None
            }
            CacheSeed::Seed(_) => Some(open_backend(config.backend).await?),
        };

        Ok(Self {
            seed: config.seed,
            backend,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    /// Open a cache, run `f` with it, and close it whether or not `f`
    /// succeeded.
    ///
    /// An error from `f` takes precedence over an error closing the cache.
    pub async fn scoped<T, F>(config: CacheConfig, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a ResponseCache) -> BoxFuture<'a, Result<T>>,
    {
        let cache = Self::open(config).await?;
        let result = f(&cache).await;
        let closed = cache.close().await;

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                log::warn!("failed to close response cache: {}", close_err);
                Err(err)
            }
        }
    }

    pub fn seed(&self) -> CacheSeed {
        self.seed
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Name of the backing store, `None` when caching is disabled.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    /// The key `request` is stored under, `None` when caching is disabled.
    pub fn key_for(&self, request: &Value) -> Option<CacheKey> {
        self.seed.value().map(|seed| CacheKey::derive(seed, request))
    }

    /// Look up the response stored under `key`.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        let Some(backend) = &self.backend else {
            return Ok(None);
        };

        match backend.get(key).await? {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("cache hit for {}", key);
                Ok(Some(entry.response))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Store `response` under `key`. A no-op when caching is disabled.
    pub async fn put(&self, key: &CacheKey, response: Value) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let entry = CacheEntry::new(key, response);
        backend.put(key, &entry).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove every entry from the backing store.
    pub async fn clear(&self) -> Result<()> {
        match &self.backend {
            Some(backend) => backend.clear().await,
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Release the backing store.
    pub async fn close(mut self) -> Result<()> {
        match self.backend.take() {
            Some(mut backend) => {
                let stats = self.stats();
                log::debug!(
                    "closing {} cache: {} hits, {} misses, {} writes",
                    backend.name(),
                    stats.hits,
                    stats.misses,
                    stats.writes
                );
                backend.close().await
            }
            None => Ok(()),
        }
    }
}

async fn open_backend(kind: CacheBackendKind) -> Result<Box<dyn CacheBackend>> {
    match kind {
        CacheBackendKind::Disk { root } => Ok(Box::new(DiskBackend::open(root).await?)),
        CacheBackendKind::Memory(store) => Ok(Box::new(MemoryBackend::new(store))),
        #[cfg(feature = "remote")]
        CacheBackendKind::Remote { url } => Ok(Box::new(RemoteBackend::open(&url)?)),
        #[cfg(not(feature = "remote"))]
        CacheBackendKind::Remote { url } => Err(Error::InvalidConfig(format!(
            "remote cache `{}` requires the `remote` feature",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_round_trip_and_stats() {
        let cache = ResponseCache::open(CacheConfig::memory(7u64, MemoryStore::new()))
            .await
            .unwrap();
        let key = cache.key_for(&json!({"q": 1})).unwrap();

        assert_eq!(cache.get(&key).await.unwrap(), None);
        cache.put(&key, json!({"a": 1})).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(json!({"a": 1})));

        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                writes: 1
            }
        );
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_seed_opens_nothing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("never-created");
        let cache = ResponseCache::open(CacheConfig::disk(CacheSeed::Disabled, &root))
            .await
            .unwrap();

        assert!(!cache.is_enabled());
        assert!(cache.key_for(&json!({})).is_none());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_builder_defaults() {
        let config = CacheConfig::builder().seed(9u64).build().unwrap();
        assert_eq!(config.seed, CacheSeed::Seed(9));
        assert!(matches!(config.backend, CacheBackendKind::Disk { .. }));
    }

    #[test]
    fn test_from_environment() {
        let env = HashMap::from([
            (CACHE_SEED_VAR.to_string(), "none".to_string()),
            (CACHE_DIR_VAR.to_string(), "/tmp/agents".to_string()),
        ]);
        let config = CacheConfig::from_environment(&env).unwrap();
        assert_eq!(config.seed, CacheSeed::Disabled);
        assert!(matches!(
            config.backend,
            CacheBackendKind::Disk { ref root } if root == &PathBuf::from("/tmp/agents")
        ));

        let env = HashMap::from([
            (CACHE_URL_VAR.to_string(), "http://cache:8080".to_string()),
            (CACHE_DIR_VAR.to_string(), "/tmp/agents".to_string()),
        ]);
        let config = CacheConfig::from_environment(&env).unwrap();
        assert_eq!(config.seed, CacheSeed::Seed(DEFAULT_CACHE_SEED));
        assert!(matches!(config.backend, CacheBackendKind::Remote { .. }));

        let env = HashMap::from([(CACHE_SEED_VAR.to_string(), "x".to_string())]);
        assert!(CacheConfig::from_environment(&env).is_err());
    }
}
