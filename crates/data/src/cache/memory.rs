use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
    inserted_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded in-process tier.
///
/// Every read-check-insert-evict sequence runs under one lock. When full,
/// expired entries are dropped first, then the oldest insertion.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

impl MemoryCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live value for `key`; an expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            entries.retain(|_, e| !e.is_expired(now));
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    tracing::debug!(key = %oldest, "Evicting oldest memory cache entry");
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            Entry {
                value: value.into(),
                expires_at: now + ttl,
                inserted_at: now,
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Entry count, including expired entries not yet dropped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn hit_then_expire() {
        let cache = MemoryCache::new(4);
        cache.insert("a", "1", MINUTE);
        cache.insert("b", "2", Duration::ZERO);
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn full_cache_drops_expired_before_live() {
        let cache = MemoryCache::new(2);
        cache.insert("stale", "x", Duration::ZERO);
        cache.insert("live", "y", MINUTE);
        cache.insert("new", "z", MINUTE);
        assert_eq!(cache.get("live").as_deref(), Some("y"));
        assert_eq!(cache.get("new").as_deref(), Some("z"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let cache = MemoryCache::new(2);
        cache.insert("first", "1", MINUTE);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("second", "2", MINUTE);
        cache.insert("third", "3", MINUTE);
        assert_eq!(cache.get("first"), None);
        assert!(cache.get("second").is_some());
        assert!(cache.get("third").is_some());
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache = MemoryCache::new(1);
        cache.insert("a", "1", MINUTE);
        cache.insert("a", "2", MINUTE);
        assert_eq!(cache.get("a").as_deref(), Some("2"));
        assert!(cache.remove("a"));
        assert!(cache.is_empty());
    }
}
