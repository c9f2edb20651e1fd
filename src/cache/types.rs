//! Core type definitions for the contact cache

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type - the raw number or address exactly as it appears in the call log
pub type CacheKey = String;

/// Contact details resolved for a single number or address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Identity of the matched contact
    pub person_id: i64,

    /// Display name of the contact
    pub name: Option<String>,

    /// Category of the matched number (home, work, mobile, ...)
    pub number_type: i32,

    /// Custom label for the number, when the category is user-defined
    pub label: Option<String>,

    /// The number or address as stored on the contact
    pub number: Option<String>,

    /// E.164 form of the number; meaningless for addresses
    pub normalized_number: Option<String>,

    /// Reference to the contact's avatar
    pub thumbnail_uri: Option<String>,

    /// Stable external identity of the contact
    pub lookup_key: Option<String>,
}

impl ContactInfo {
    /// Create contact info with an identity and a display name
    pub fn new(person_id: i64, name: impl Into<String>) -> Self {
        Self {
            person_id,
            name: Some(name.into()),
            number_type: 0,
            label: None,
            number: None,
            normalized_number: None,
            thumbnail_uri: None,
            lookup_key: None,
        }
    }

    /// Set the number category and its optional custom label
    pub fn with_type(mut self, number_type: i32, label: Option<String>) -> Self {
        self.number_type = number_type;
        self.label = label;
        self
    }

    /// Set the canonical and normalized number
    pub fn with_number(mut self, number: impl Into<String>, normalized: Option<String>) -> Self {
        self.number = Some(number.into());
        self.normalized_number = normalized;
        self
    }

    /// Set the avatar reference
    pub fn with_thumbnail(mut self, uri: impl Into<String>) -> Self {
        self.thumbnail_uri = Some(uri.into());
        self
    }

    /// Set the external identity key
    pub fn with_lookup_key(mut self, key: impl Into<String>) -> Self {
        self.lookup_key = Some(key.into());
        self
    }

    /// Whether the record carries a non-empty display name
    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// Outcome of resolving a key that the cache is allowed to store
///
/// `NotFound` is a terminal, cacheable answer: it suppresses repeated lookups
/// for numbers with no matching contact until the cache is invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "contact", rename_all = "snake_case")]
pub enum ContactRecord {
    /// A contact matched the key
    Found(ContactInfo),

    /// No contact matches the key
    NotFound,
}

impl ContactRecord {
    /// Borrow the contact details, if any
    pub fn contact(&self) -> Option<&ContactInfo> {
        match self {
            ContactRecord::Found(info) => Some(info),
            ContactRecord::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ContactRecord::Found(_))
    }
}

impl From<ContactInfo> for ContactRecord {
    fn from(info: ContactInfo) -> Self {
        ContactRecord::Found(info)
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that found a fresh entry
    pub hits: u64,

    /// Reads that found an expired entry (served anyway)
    pub stale_hits: u64,

    /// Reads that found nothing
    pub misses: u64,

    /// Number of entries currently in cache
    pub entries: usize,

    /// Maximum number of entries
    pub capacity: usize,

    /// Number of entries dropped to make room for new keys
    pub evictions: u64,

    /// Number of entries marked expired by bulk invalidation
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage, counting stale hits as hits
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_hits;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            (served as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Share of served reads that returned stale data, as a percentage
    pub fn stale_rate(&self) -> f64 {
        let served = self.hits + self.stale_hits;
        if served == 0 {
            0.0
        } else {
            (self.stale_hits as f64 / served as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, stale_hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}/{}, evictions: {} }}",
            self.hits,
            self.stale_hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.capacity,
            self.evictions
        )
    }
}
