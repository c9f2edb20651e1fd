//! Coordinator tying the cache, queue, worker and scheduling together
//!
//! `ContactInfoResolver` is what the list layer talks to. Binding a row reads
//! the cache and queues a refresh when the entry is missing or expired; the
//! worker fills the cache in the background and a coalesced redraw signal
//! tells the list to bind again.

use crate::binder::{compose_details, CallRow, NumberFormatter, RowDetails};
use crate::cache::{
    config::ResolverConfig,
    store::ExpirableCache,
    types::{CacheStats, ContactRecord},
};
use crate::error::{ResolverError, Result};
use crate::lookup::{AddressScheme, LookupSource};
use crate::notifier::{DeferredStart, RedrawListener, RedrawNotifier};
use crate::queue::{Priority, RefreshQueue, RefreshRequest};
use crate::worker::{ResolverWorker, WorkerController, WorkerState};
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct Inner {
    config: ResolverConfig,
    runtime: Handle,
    cache: Arc<ExpirableCache>,
    queue: Arc<RefreshQueue>,
    source: Arc<dyn LookupSource>,
    notifier: Arc<RedrawNotifier>,
    formatter: Arc<dyn NumberFormatter>,
    controller: WorkerController,
    deferred_start: DeferredStart,
    resolution_disabled: AtomicBool,
    loading: AtomicBool,
}

impl Inner {
    fn start_resolving(&self) -> bool {
        if self.resolution_disabled.load(Ordering::Acquire) {
            debug!("Background resolution disabled, not starting worker");
            return false;
        }

        let worker = ResolverWorker::new(
            self.config.worker_name.clone(),
            self.cache.clone(),
            self.queue.clone(),
            self.source.clone(),
            self.notifier.clone(),
            self.config.poll_interval,
        );
        self.controller.start(&self.runtime, worker)
    }
}

/// Stale-while-revalidate contact resolution for call log rows
pub struct ContactInfoResolver {
    inner: Arc<Inner>,
}

impl ContactInfoResolver {
    /// Create a resolver and the listener that receives its redraw requests
    ///
    /// Must be called from within a tokio runtime; the worker and the
    /// deferred-start timer are spawned on it. The worker is not started here.
    pub fn new(
        config: ResolverConfig,
        source: Arc<dyn LookupSource>,
        formatter: Arc<dyn NumberFormatter>,
    ) -> Result<(Self, RedrawListener)> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ResolverError::NoRuntime)?;

        info!("Initializing contact resolver with config: {:?}", config);

        let cache = Arc::new(ExpirableCache::with_capacity(config.cache_capacity)?);
        let (notifier, listener) = RedrawNotifier::channel();

        let inner = Arc::new(Inner {
            config,
            runtime,
            cache,
            queue: Arc::new(RefreshQueue::new()),
            source,
            notifier: Arc::new(notifier),
            formatter,
            controller: WorkerController::new(),
            deferred_start: DeferredStart::new(),
            resolution_disabled: AtomicBool::new(false),
            loading: AtomicBool::new(true),
        });

        Ok((Self { inner }, listener))
    }

    /// Bind a single row
    pub fn bind_row(&self, row: &CallRow) -> Option<RowDetails> {
        self.bind_group(slice::from_ref(row))
    }

    /// Bind a group of rows that share the first row's number
    ///
    /// Never waits on a lookup. A number with no cache entry gets a `NotFound`
    /// placeholder and an immediate refresh; an expired entry is rendered
    /// as-is and refreshed later; a fresh entry is rendered as-is.
    pub fn bind_group(&self, rows: &[CallRow]) -> Option<RowDetails> {
        let row = rows.first()?;
        let number = row.number.as_str();

        // The first bound row waits for its render to settle
        self.inner.deferred_start.arm();

        let cached = self.inner.cache.get_cached_value(number);
        let entry = match &cached {
            None => {
                self.inner.cache.put(number, ContactRecord::NotFound);
                self.request_refresh(RefreshRequest::immediate(number));
                None
            }
            Some(value) => {
                if value.is_expired() {
                    self.request_refresh(RefreshRequest::deferred(number));
                }
                Some(value.entry().as_ref())
            }
        };

        compose_details(
            rows,
            entry,
            self.inner.formatter.as_ref(),
            &self.inner.config.default_country_iso,
        )
    }

    /// Queue a refresh for a number
    ///
    /// An immediate request starts the worker if the first render has not
    /// settled yet. Returns whether the number was newly queued.
    pub fn request_refresh(&self, request: RefreshRequest) -> bool {
        if self.inner.resolution_disabled.load(Ordering::Acquire) {
            return false;
        }

        let added = self.inner.queue.enqueue(request.key);

        if request.priority == Priority::Immediate && self.inner.deferred_start.fire() {
            debug!("Immediate request before first render settled, starting worker now");
            self.inner.start_resolving();
        }

        added
    }

    /// Report that a render pass completed
    ///
    /// The first report after rows were bound schedules the worker start after
    /// the configured delay. Later reports do nothing.
    pub fn on_render_settled(&self) -> bool {
        if !self.inner.deferred_start.fire() {
            return false;
        }

        debug!(
            "First render settled, starting worker in {:?}",
            self.inner.config.start_delay
        );
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.deferred_start.schedule(
            &self.inner.runtime,
            self.inner.config.start_delay,
            move |epoch| {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .deferred_start
                        .run_if_current(epoch, || {
                            inner.start_resolving();
                        });
                }
            },
        );
        true
    }

    /// Start the background worker; returns `false` if it is already active
    /// or resolution is disabled
    pub fn start_resolving(&self) -> bool {
        self.inner.start_resolving()
    }

    /// Stop the background worker and cancel any pending deferred start
    ///
    /// Queued numbers are kept and will be processed after the next start.
    /// The returned task completes once the worker has exited.
    pub fn stop_resolving(&self) -> Option<JoinHandle<()>> {
        self.inner.deferred_start.cancel();
        self.inner.controller.stop()
    }

    /// Stop the worker and wait for it to exit
    pub async fn shutdown(&self) {
        if let Some(task) = self.stop_resolving() {
            let _ = task.await;
        }
    }

    /// Mark every cached contact expired without dropping it
    ///
    /// Rows keep rendering the old data; the next bind queues refreshes, and
    /// the next settled render restarts the worker. A start already scheduled
    /// by an earlier render still happens.
    pub fn invalidate_all(&self) {
        self.inner.cache.expire_all();
        self.inner.deferred_start.reset();
    }

    /// Cached record for a number, expired or not, without queueing anything
    pub fn contact_info(&self, number: &str) -> Option<ContactRecord> {
        self.inner.cache.get_possibly_expired(number)
    }

    /// Seed the cache directly, bypassing the worker
    pub fn inject_resolved(&self, number: &str, record: ContactRecord) {
        self.inner.cache.put(number, record);
    }

    /// Make refresh requests no-ops and prevent the worker from starting
    pub fn disable_background_resolution(&self) {
        info!("Background contact resolution disabled");
        self.inner.resolution_disabled.store(true, Ordering::Release);
    }

    /// Pick the better of the call-log number and the contact's stored number
    ///
    /// The contact's number wins when it starts with `+` or is longer, since
    /// the network may have delivered the caller id in a local format. Uses
    /// the cache first and queries the directory otherwise; lookup failures
    /// fall back to the call-log number.
    pub async fn better_number(&self, number: &str) -> String {
        let cached = self
            .inner
            .cache
            .get_possibly_expired(number)
            .and_then(|record| record.contact().and_then(|info| info.number.clone()));

        let candidate = match cached {
            Some(candidate) => Some(candidate),
            None => match self
                .inner
                .source
                .resolve(number, AddressScheme::Number)
                .await
            {
                Ok(record) => record.contact().and_then(|info| info.number.clone()),
                Err(e) => {
                    debug!("Better number lookup failed for {}: {}", number, e);
                    None
                }
            },
        };

        match candidate {
            Some(candidate)
                if !candidate.is_empty()
                    && (candidate.starts_with('+') || candidate.len() > number.len()) =>
            {
                candidate
            }
            _ => number.to_string(),
        }
    }

    /// Record whether the call log query is still running
    pub fn set_loading(&self, loading: bool) {
        self.inner.loading.store(loading, Ordering::Release);
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::Acquire)
    }

    /// Whether the list should show its empty state
    ///
    /// Never true while loading, so the placeholder does not flash mid-query.
    pub fn is_empty(&self, row_count: usize) -> bool {
        !self.is_loading() && row_count == 0
    }

    pub fn worker_state(&self) -> WorkerState {
        self.inner.controller.state()
    }

    /// Number of numbers waiting to be resolved
    pub fn pending_requests(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }
}

impl Drop for ContactInfoResolver {
    fn drop(&mut self) {
        self.stop_resolving();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{BasicNumberFormatter, CallType};
    use crate::cache::types::ContactInfo;
    use crate::lookup::InMemoryDirectory;

    fn directory() -> InMemoryDirectory {
        let mut directory = InMemoryDirectory::new();
        directory.insert_number(
            "6505550100",
            ContactInfo::new(1, "Alice").with_number("+16505550100", Some("+16505550100".into())),
        );
        directory
    }

    fn resolver(directory: InMemoryDirectory) -> (ContactInfoResolver, RedrawListener) {
        ContactInfoResolver::new(
            ResolverConfig::responsive(),
            Arc::new(directory),
            Arc::new(BasicNumberFormatter),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_runtime() {
        let result = ContactInfoResolver::new(
            ResolverConfig::default(),
            Arc::new(InMemoryDirectory::new()),
            Arc::new(BasicNumberFormatter),
        );
        assert!(matches!(result, Err(ResolverError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = ResolverConfig::builder().cache_capacity(0).build();
        let result = ContactInfoResolver::new(
            config,
            Arc::new(InMemoryDirectory::new()),
            Arc::new(BasicNumberFormatter),
        );
        assert!(matches!(result, Err(ResolverError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_bind_missing_number_places_placeholder() {
        let (resolver, _listener) = resolver(directory());
        resolver.disable_background_resolution();

        let details = resolver
            .bind_row(&CallRow::new(1, "6505550100", CallType::Incoming))
            .unwrap();

        assert!(details.contact.is_none());
        assert_eq!(details.formatted_number, "(650) 555-0100");
        assert_eq!(resolver.contact_info("6505550100"), Some(ContactRecord::NotFound));
        assert_eq!(resolver.pending_requests(), 0);
        assert_eq!(resolver.worker_state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_injected_contact_renders_without_refresh() {
        let (resolver, _listener) = resolver(directory());
        resolver.disable_background_resolution();
        resolver.inject_resolved(
            "5550199",
            ContactRecord::Found(ContactInfo::new(2, "Bob").with_number("5550199", None)),
        );

        let details = resolver
            .bind_row(&CallRow::new(1, "5550199", CallType::Missed))
            .unwrap();

        assert_eq!(details.contact.map(|c| c.name), Some("Bob".to_string()));
    }

    #[tokio::test]
    async fn test_immediate_request_starts_worker_once() {
        let (resolver, _listener) = resolver(directory());

        resolver.bind_row(&CallRow::new(1, "6505550100", CallType::Incoming));
        assert!(resolver.worker_state().is_active());

        // Already fired; a second missing number only queues
        resolver.bind_row(&CallRow::new(2, "5550199", CallType::Incoming));
        assert!(resolver.worker_state().is_active());

        resolver.shutdown().await;
        assert_eq!(resolver.worker_state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_better_number() {
        let (resolver, _listener) = resolver(directory());
        resolver.disable_background_resolution();

        // Directory knows the number in international format
        assert_eq!(resolver.better_number("6505550100").await, "+16505550100");
        // Unknown numbers are returned unchanged
        assert_eq!(resolver.better_number("5550199").await, "5550199");

        // Cached contact with a shorter local number does not win
        resolver.inject_resolved(
            "0016505550123",
            ContactRecord::Found(ContactInfo::new(3, "Carol").with_number("5550123", None)),
        );
        assert_eq!(resolver.better_number("0016505550123").await, "0016505550123");
    }

    #[tokio::test]
    async fn test_loading_state() {
        let (resolver, _listener) = resolver(directory());

        assert!(resolver.is_loading());
        assert!(!resolver.is_empty(0));

        resolver.set_loading(false);
        assert!(resolver.is_empty(0));
        assert!(!resolver.is_empty(3));
    }
}
