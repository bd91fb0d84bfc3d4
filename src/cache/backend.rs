//! The storage contract shared by every cache backend.

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::key::CacheKey;
use crate::error::{Error, Result};

/// A stored response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The key the entry was stored under.
    pub key: String,
    /// The cached response payload.
    pub response: Value,
    /// When the entry was written (Unix timestamp, seconds).
    pub created_at: u64,
}

impl CacheEntry {
    pub fn new(key: &CacheKey, response: Value) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            key: key.as_str().to_string(),
            response,
            created_at,
        }
    }

    /// Decode a stored entry and check it belongs to `key`.
    pub fn decode(key: &CacheKey, bytes: &[u8]) -> Result<Self> {
        let entry: CacheEntry =
            serde_json::from_slice(bytes).map_err(|e| Error::CacheCorrupted {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if entry.key != key.as_str() {
            return Err(Error::CacheCorrupted {
                key: key.to_string(),
                reason: format!("entry was stored under {}", entry.key),
            });
        }
        Ok(entry)
    }
}

/// Storage behind a [`ResponseCache`](crate::cache::ResponseCache).
///
/// Implementations must make each `put` atomic per key: a concurrent `get`
/// sees either the previous entry or the new one, never a partial write.
/// Concurrent `put`s to one key may race; the last write wins.
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the entry for `key`, `None` when absent.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store `entry` under `key`, replacing any previous entry.
    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;

    /// Release held resources. The backend is not used afterwards.
    async fn close(&mut self) -> Result<()>;
}
