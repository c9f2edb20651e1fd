//! # Call Log Contact Resolver (calllog-resolver)
//!
//! Resolves the contact behind each call log number without ever making the
//! list wait for it.
//!
//! ## Features
//!
//! - Stale-while-revalidate cache: expired contacts keep rendering until replaced
//! - Single background worker with a deduplicated FIFO of pending numbers
//! - Redraw requests coalesced into one signal per burst of changes
//! - Worker start deferred until the first render settles
//! - Lookup failures and panics isolated to the number that caused them
//!
//! ## Binding Rows
//!
//! ```no_run
//! use calllog_resolver::{
//!     BasicNumberFormatter, CallRow, CallType, ContactInfo, ContactInfoResolver,
//!     InMemoryDirectory, ResolverConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut directory = InMemoryDirectory::new();
//!     directory.insert_number("6505550100", ContactInfo::new(1, "Alice"));
//!
//!     let (resolver, mut redraws) = ContactInfoResolver::new(
//!         ResolverConfig::from_env()?,
//!         Arc::new(directory),
//!         Arc::new(BasicNumberFormatter),
//!     )?;
//!
//!     let row = CallRow::new(1, "6505550100", CallType::Incoming);
//!
//!     // First pass renders the raw number and queues a lookup
//!     let details = resolver.bind_row(&row);
//!     resolver.on_render_settled();
//!     println!("{:?}", details);
//!
//!     // The worker reports that something changed; bind again
//!     if redraws.changed().await {
//!         println!("{:?}", resolver.bind_row(&row));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Invalidation
//!
//! When the app returns to the foreground, expire everything. Rows keep
//! showing what they showed before and are refreshed in the background.
//!
//! ```no_run
//! # use calllog_resolver::ContactInfoResolver;
//! # fn on_resume(resolver: &ContactInfoResolver) {
//! resolver.invalidate_all();
//! # }
//! ```

pub mod binder;
pub mod cache;
pub mod error;
pub mod lookup;
pub mod notifier;
pub mod queue;
pub mod resolver;
pub mod worker;

// Re-export main types for convenience
pub use binder::{
    BasicNumberFormatter, CallRow, CallType, ContactDisplay, NumberFormatter, RowDetails,
    SecondaryAction,
};
pub use cache::{
    CacheEntry, CacheKey, CacheStats, CachedValue, ContactInfo, ContactRecord, ExpirableCache,
    ResolverConfig, ResolverConfigBuilder,
};
pub use error::{ResolverError, Result};
pub use lookup::{AddressScheme, InMemoryDirectory, LookupSource};
pub use notifier::{RedrawListener, RedrawNotifier};
pub use queue::{Priority, RefreshQueue, RefreshRequest};
pub use resolver::ContactInfoResolver;
pub use worker::{RefreshOutcome, WorkerState};
