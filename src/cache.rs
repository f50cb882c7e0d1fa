/// Cache seam for load samples, plus a bundled in-memory TTL store

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error reported by a cache implementation
#[derive(Debug, Clone, Error)]
#[error("cache error: {0}")]
pub struct CacheError(String);

impl CacheError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

/// Key/value store with TTL-aware writes
///
/// Load samples are the only values the guard stores. Both operations may
/// fail; the estimator absorbs those failures, so implementations should
/// report errors rather than papering over them.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Read a previously written sample, `None` on miss or expiry
    async fn read(&self, key: &str) -> Result<Option<f64>, CacheError>;

    /// Write a sample, retained for at most `ttl`
    async fn write(&self, key: &str, value: f64, ttl: Duration) -> Result<(), CacheError>;
}

struct Entry {
    value: f64,
    expires_at: Instant,
}

/// In-process TTL cache backed by a concurrent map
///
/// Expired entries are dropped lazily on read. Concurrent writers to the same
/// key race and the last write wins, which matches how the estimator uses the
/// cache: near-identical fresh samples from racing cache misses.
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn read(&self, key: &str) -> Result<Option<f64>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value));
            }
        }
        // Expired entries are removed on the read path
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        Ok(None)
    }

    async fn write(&self, key: &str, value: f64, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
