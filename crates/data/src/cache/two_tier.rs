use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{CacheKind, MemoryCache, PersistentStore};
use crate::error::CacheError;

/// Hit/miss counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub store_hits: u64,
    pub misses: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.store_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    misses: AtomicU64,
}

/// In-process tier over an optional persistent tier.
///
/// Reads try memory, then the store; a store hit is promoted into memory
/// for at most `memory_ttl_cap`. Writes go to both tiers.
pub struct TwoTierCache {
    memory: MemoryCache,
    store: Option<Arc<dyn PersistentStore>>,
    memory_ttl_cap: Duration,
    counters: Counters,
}

impl std::fmt::Debug for TwoTierCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoTierCache")
            .field("memory", &self.memory)
            .field("persistent", &self.store.is_some())
            .field("memory_ttl_cap", &self.memory_ttl_cap)
            .finish()
    }
}

impl TwoTierCache {
    /// Memory-only cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            memory: MemoryCache::new(capacity),
            store: None,
            memory_ttl_cap: Duration::from_secs(300),
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_memory_ttl_cap(mut self, cap: Duration) -> Self {
        self.memory_ttl_cap = cap;
        self
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            store_hits: self.counters.store_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    /// Raw value for `key` from whichever tier has it.
    ///
    /// # Errors
    /// Returns `CacheError` if the persistent tier fails.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(value) = self.memory.get(key) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(value));
        }

        let Some(store) = &self.store else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        match store.get(key).await? {
            Some(entry) => {
                self.counters.store_hits.fetch_add(1, Ordering::Relaxed);
                let ttl = entry.ttl_remaining.min(self.memory_ttl_cap);
                tracing::debug!(key, ttl_ms = ttl.as_millis() as u64, "Promoted cache entry to memory");
                self.memory.insert(key, entry.value.clone(), ttl);
                Ok(Some(entry.value))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Writes `value` to both tiers. Memory keeps it for at most `memory_ttl_cap`.
    ///
    /// # Errors
    /// Returns `CacheError` if the persistent tier fails; the memory tier is
    /// written regardless.
    pub async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.memory.insert(key, value, ttl.min(self.memory_ttl_cap));
        if let Some(store) = &self.store {
            store.set(key, value, ttl).await?;
        }
        Ok(())
    }

    /// Drops `key` from both tiers.
    ///
    /// # Errors
    /// Returns `CacheError` if the persistent tier fails.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.memory.remove(key);
        if let Some(store) = &self.store {
            store.delete(key).await?;
        }
        Ok(())
    }

    /// Typed read. A value that no longer parses as `T` is dropped and
    /// reported as a miss.
    ///
    /// # Errors
    /// Returns `CacheError` if the persistent tier fails.
    pub async fn get<T: DeserializeOwned>(
        &self,
        kind: CacheKind,
        id: &str,
    ) -> Result<Option<T>, CacheError> {
        let key = kind.key(id);
        let Some(raw) = self.get_raw(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Dropping unparseable cache entry");
                self.invalidate(&key).await?;
                Ok(None)
            }
        }
    }

    /// Typed write with the TTL of `kind`.
    ///
    /// # Errors
    /// Returns `CacheError` if serialization or the persistent tier fails.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        kind: CacheKind,
        id: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(&kind.key(id), &raw, kind.ttl()).await
    }

    /// Deletes expired rows from the persistent tier.
    ///
    /// # Errors
    /// Returns `CacheError` if the persistent tier fails.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        match &self.store {
            Some(store) => store.purge_expired().await,
            None => Ok(0),
        }
    }
}
