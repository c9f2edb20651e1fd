//! Bounded contact cache whose entries expire without being purged

use crate::cache::{
    entry::{CacheEntry, CachedValue},
    types::{CacheKey, CacheStats, ContactRecord},
};
use crate::error::{ResolverError, Result};
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Contact cache shared by the rendering path and the resolver worker
///
/// This implementation provides:
/// - Reads that never perform I/O and only hold a read lock long enough to
///   clone an `Arc`
/// - Whole-entry replacement on `put`, so readers see the previous or the
///   newest record for a key and never a partial one
/// - Bulk expiry that keeps values servable until they are replaced
/// - Eviction of the least recently written entry once capacity is reached
///
/// Reads go through `peek` and do not reorder the eviction queue; only writes
/// refresh an entry's position.
pub struct ExpirableCache {
    entries: RwLock<LruCache<CacheKey, Arc<CacheEntry>>>,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ExpirableCache {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: NonZeroUsize) -> Self {
        info!("Initializing contact cache (capacity: {})", capacity);

        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            counters: Counters::default(),
        }
    }

    /// Create a cache from a plain capacity, rejecting zero
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            ResolverError::ConfigError("cache capacity must be greater than 0".to_string())
        })?;
        Ok(Self::new(capacity))
    }

    /// Get the entry for a key, expired or not
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let entry = self.peek(key);

        match &entry {
            Some(e) if e.is_expired() => {
                self.counters.stale_hits.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                debug!("Cache miss: {}", key);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
            }
        }

        entry
    }

    /// Get the entry for a key without recording a hit or miss
    pub fn peek(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.entries.read().peek(key).cloned()
    }

    /// Get the record and its expiry flag as one consistent snapshot
    pub fn get_cached_value(&self, key: &str) -> Option<CachedValue> {
        self.get(key).map(CachedValue::new)
    }

    /// Get the record for a key, expired or not
    pub fn get_possibly_expired(&self, key: &str) -> Option<ContactRecord> {
        self.get(key).map(|entry| entry.record.clone())
    }

    /// Store a record, replacing any previous entry for the key
    ///
    /// The new entry is fresh and carries no formatted number. If the cache is
    /// full and the key is new, the least recently written entry is evicted;
    /// the entry being written is never the victim.
    pub fn put(&self, key: impl Into<CacheKey>, record: ContactRecord) {
        let key = key.into();
        let entry = Arc::new(CacheEntry::new(key.clone(), record));

        let displaced = self.entries.write().push(key.clone(), entry);

        match displaced {
            Some((old_key, _)) if old_key != key => {
                debug!("Evicting cache entry due to capacity: {}", old_key);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => debug!("Updating existing cache entry: {}", key),
            None => debug!("Inserting new cache entry: {}", key),
        }
    }

    /// Mark every entry expired without removing any of them
    pub fn expire_all(&self) {
        let entries = self.entries.read();
        let mut count = 0u64;

        for (_, entry) in entries.iter() {
            if !entry.is_expired() {
                entry.mark_expired();
                count += 1;
            }
        }

        self.counters.expirations.fetch_add(count, Ordering::Relaxed);
        info!("Expired {} of {} cache entries", count, entries.len());
    }

    /// Check if a key is present (without touching statistics)
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains(key)
    }

    /// Get number of entries in cache
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.entries.read().cap().get()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();

        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            stale_hits: self.counters.stale_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            entries: entries.len(),
            capacity: entries.cap().get(),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::ContactInfo;

    fn found(name: &str) -> ContactRecord {
        ContactRecord::Found(ContactInfo::new(1, name))
    }

    #[test]
    fn test_basic_put_and_get() {
        let cache = ExpirableCache::with_capacity(10).unwrap();

        cache.put("5550100", found("Alice"));

        let entry = cache.get("5550100").unwrap();
        assert_eq!(entry.record, found("Alice"));
        assert!(!entry.is_expired());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_cache_miss() {
        let cache = ExpirableCache::with_capacity(10).unwrap();

        assert!(cache.get("nonexistent").is_none());
        assert!(cache.get_cached_value("nonexistent").is_none());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            ExpirableCache::with_capacity(0),
            Err(ResolverError::ConfigError(_))
        ));
    }

    #[test]
    fn test_expire_all_keeps_values() {
        let cache = ExpirableCache::with_capacity(10).unwrap();
        cache.put("a", found("Alice"));
        cache.put("b", ContactRecord::NotFound);

        cache.expire_all();

        let a = cache.get_cached_value("a").unwrap();
        assert!(a.is_expired());
        assert_eq!(a.value(), &found("Alice"));
        assert_eq!(cache.get_possibly_expired("b"), Some(ContactRecord::NotFound));
        assert_eq!(cache.len(), 2);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 2);
        assert!(stats.stale_hits >= 2);
    }

    #[test]
    fn test_put_clears_expiry_and_formatting() {
        let cache = ExpirableCache::with_capacity(10).unwrap();
        cache.put("a", found("Alice"));
        cache
            .get("a")
            .unwrap()
            .formatted_number_or_init(|| "555-0100".to_string());
        cache.expire_all();

        cache.put("a", found("Alice"));

        let entry = cache.get("a").unwrap();
        assert!(!entry.is_expired());
        assert!(entry.formatted_number().is_none());
    }

    #[test]
    fn test_capacity_eviction_order() {
        let cache = ExpirableCache::with_capacity(2).unwrap();

        cache.put("A", found("Alice"));
        cache.put("B", found("Bob"));
        cache.put("C", found("Carol"));

        // A was written least recently
        assert!(cache.get("A").is_none());
        assert_eq!(cache.get_possibly_expired("B"), Some(found("Bob")));
        assert_eq!(cache.get_possibly_expired("C"), Some(found("Carol")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_rewrite_refreshes_eviction_position() {
        let cache = ExpirableCache::with_capacity(2).unwrap();

        cache.put("A", found("Alice"));
        cache.put("B", found("Bob"));
        cache.put("A", found("Alice"));
        cache.put("C", found("Carol"));

        assert!(cache.contains_key("A"));
        assert!(!cache.contains_key("B"));
        assert!(cache.contains_key("C"));
    }

    #[test]
    fn test_reads_do_not_reorder() {
        let cache = ExpirableCache::with_capacity(2).unwrap();

        cache.put("A", found("Alice"));
        cache.put("B", found("Bob"));
        cache.get("A");
        cache.put("C", found("Carol"));

        assert!(!cache.contains_key("A"));
        assert!(cache.contains_key("B"));
    }

    #[test]
    fn test_capacity_one_keeps_latest_write() {
        let cache = ExpirableCache::with_capacity(1).unwrap();

        cache.put("A", found("Alice"));
        cache.put("B", found("Bob"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.get_possibly_expired("B"), Some(found("Bob")));
    }

    #[test]
    fn test_reader_keeps_snapshot_across_overwrite() {
        let cache = ExpirableCache::with_capacity(4).unwrap();
        cache.put("a", found("Alice"));

        let snapshot = cache.get("a").unwrap();
        cache.put("a", found("Alicia"));

        assert_eq!(snapshot.record, found("Alice"));
        assert_eq!(cache.get_possibly_expired("a"), Some(found("Alicia")));
    }

    #[test]
    fn test_concurrent_reader_and_writer() {
        let cache = Arc::new(ExpirableCache::with_capacity(8).unwrap());
        cache.put("k", found("v0"));

        let writer = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for i in 1..=500 {
                    cache.put("k", found(&format!("v{}", i)));
                    if i % 50 == 0 {
                        cache.expire_all();
                    }
                }
            })
        };

        for _ in 0..500 {
            let record = cache.get_possibly_expired("k").unwrap();
            let name = record.contact().and_then(|c| c.name.clone()).unwrap();
            assert!(name.starts_with('v'));
        }

        writer.join().unwrap();
        assert_eq!(cache.get_possibly_expired("k"), Some(found("v500")));
    }
}
