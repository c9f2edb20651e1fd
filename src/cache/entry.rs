//! Cache entry with an expiry flag and lazily derived formatting

use crate::cache::types::{CacheKey, ContactInfo, ContactRecord};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// A resolved record as held by the cache
///
/// Entries are immutable apart from two single-direction transitions: the
/// expiry flag can be raised by a bulk invalidation, and the formatted number
/// can be assigned once. Overwriting a key replaces the whole entry, which
/// discards both.
#[derive(Debug)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The resolved record
    pub record: ContactRecord,

    /// When the record was written
    pub resolved_at: DateTime<Utc>,

    expired: AtomicBool,

    formatted_number: OnceLock<String>,
}

impl CacheEntry {
    /// Create a fresh (non-expired) entry
    pub fn new(key: CacheKey, record: ContactRecord) -> Self {
        Self {
            key,
            record,
            resolved_at: Utc::now(),
            expired: AtomicBool::new(false),
            formatted_number: OnceLock::new(),
        }
    }

    /// Check if the entry has been marked expired
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Mark the entry expired; the record stays readable
    pub fn mark_expired(&self) {
        self.expired.store(true, Ordering::Release);
    }

    /// Contact details, if the record is a match
    pub fn contact(&self) -> Option<&ContactInfo> {
        self.record.contact()
    }

    /// The formatted number, if it has been computed for this record
    pub fn formatted_number(&self) -> Option<&str> {
        self.formatted_number.get().map(String::as_str)
    }

    /// Return the formatted number, computing it on first use
    ///
    /// Concurrent callers race to initialise; exactly one value wins and every
    /// caller observes it.
    pub fn formatted_number_or_init<F>(&self, format: F) -> &str
    where
        F: FnOnce() -> String,
    {
        self.formatted_number.get_or_init(format)
    }
}

/// Snapshot returned to the rendering path: the entry plus its expiry state
/// at the moment it was read
#[derive(Debug, Clone)]
pub struct CachedValue {
    entry: Arc<CacheEntry>,
    expired: bool,
}

impl CachedValue {
    pub(crate) fn new(entry: Arc<CacheEntry>) -> Self {
        let expired = entry.is_expired();
        Self { entry, expired }
    }

    /// The cached record
    pub fn value(&self) -> &ContactRecord {
        &self.entry.record
    }

    /// Whether the record was expired when it was read
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// The underlying shared entry
    pub fn entry(&self) -> &Arc<CacheEntry> {
        &self.entry
    }
}
