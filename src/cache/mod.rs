//! # Expirable Contact Cache
//!
//! A bounded map from raw call-log numbers to resolved contact records.
//!
//! ## Features
//!
//! - **Stale reads**: expired entries stay readable until the resolver replaces them
//! - **Bulk expiry**: `expire_all` flags every entry in place instead of purging
//! - **Bounded size**: least recently written entries are evicted at capacity
//! - **Lock-light reads**: the rendering path clones an `Arc` under a read lock
//! - **Derived formatting**: each entry formats its number at most once
//!
//! ## Example
//!
//! ```rust
//! use calllog_resolver::cache::{ContactInfo, ContactRecord, ExpirableCache};
//!
//! # fn example() -> calllog_resolver::Result<()> {
//! let cache = ExpirableCache::with_capacity(100)?;
//!
//! cache.put("+15550100", ContactRecord::Found(ContactInfo::new(1, "Alice")));
//! cache.expire_all();
//!
//! // Still served, but flagged for refresh
//! let cached = cache.get_cached_value("+15550100").unwrap();
//! assert!(cached.is_expired());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod store;
pub mod types;

pub use config::{ResolverConfig, ResolverConfigBuilder};
pub use entry::{CacheEntry, CachedValue};
pub use store::ExpirableCache;
pub use types::{CacheKey, CacheStats, ContactInfo, ContactRecord};
