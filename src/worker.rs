//! Background resolver: drains the refresh queue into the cache
//!
//! A single long-lived task per run. It pops numbers in FIFO order, resolves
//! each through the lookup source, writes the result into the cache and
//! remembers whether anything visibly changed. When the queue runs dry it
//! emits one redraw for the whole burst and waits, bounded by the poll
//! interval so a stop request is always noticed.

use crate::cache::store::ExpirableCache;
use crate::cache::types::ContactRecord;
use crate::lookup::{AddressScheme, LookupSource};
use crate::notifier::RedrawNotifier;
use crate::queue::RefreshQueue;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of the resolver worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl WorkerState {
    /// Whether a worker is live or about to be
    pub fn is_active(&self) -> bool {
        matches!(self, WorkerState::Starting | WorkerState::Running)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Stopped => write!(f, "stopped"),
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Stopping => write!(f, "stopping"),
        }
    }
}

/// What a single refresh did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The record differs from what was cached; a redraw is needed
    Changed,

    /// The record matches the cached one; only its freshness was renewed
    Confirmed,

    /// The lookup failed; the cache was left untouched
    Failed,
}

/// The resolution loop and everything it touches
#[derive(Clone)]
pub struct ResolverWorker {
    name: String,
    cache: Arc<ExpirableCache>,
    queue: Arc<RefreshQueue>,
    source: Arc<dyn LookupSource>,
    notifier: Arc<RedrawNotifier>,
    poll_interval: Duration,
}

impl ResolverWorker {
    pub fn new(
        name: impl Into<String>,
        cache: Arc<ExpirableCache>,
        queue: Arc<RefreshQueue>,
        source: Arc<dyn LookupSource>,
        notifier: Arc<RedrawNotifier>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            cache,
            queue,
            source,
            notifier,
            poll_interval,
        }
    }

    /// Resolve one number and store the result
    pub async fn refresh(&self, key: &str) -> RefreshOutcome {
        match self.lookup(key).await {
            Some(record) => self.store(key, record),
            None => RefreshOutcome::Failed,
        }
    }

    /// Query the lookup source, turning errors and panics into `None`
    async fn lookup(&self, key: &str) -> Option<ContactRecord> {
        let scheme = AddressScheme::classify(key);
        debug!("Resolving {} as {}", key, scheme);

        match AssertUnwindSafe(self.source.resolve(key, scheme))
            .catch_unwind()
            .await
        {
            Ok(Ok(record)) => Some(record),
            Ok(Err(e)) => {
                warn!("Contact lookup failed for {}: {}", key, e);
                None
            }
            Err(_) => {
                warn!("Contact lookup panicked for {}, skipping", key);
                None
            }
        }
    }

    /// Write a resolved record, reporting whether it changed
    ///
    /// Equal records are written anyway so the entry stops being expired.
    fn store(&self, key: &str, record: ContactRecord) -> RefreshOutcome {
        let previous = self.cache.peek(key);
        let changed = previous
            .as_ref()
            .map_or(true, |existing| existing.record != record);

        self.cache.put(key, record);

        match previous {
            Some(existing) if !changed => {
                debug!(
                    "Contact info for {} unchanged since {}",
                    key, existing.resolved_at
                );
                RefreshOutcome::Confirmed
            }
            _ => {
                debug!("Contact info changed for {}", key);
                RefreshOutcome::Changed
            }
        }
    }

    /// Run until the stop flag is raised
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("Contact resolver {} running", self.name);
        let mut needs_redraw = false;

        loop {
            if *stop.borrow() {
                break;
            }

            let key = match self.queue.try_dequeue() {
                Some(key) => key,
                None => {
                    if needs_redraw {
                        needs_redraw = false;
                        self.notifier.notify();
                    }

                    tokio::select! {
                        key = self.queue.dequeue_blocking(self.poll_interval) => match key {
                            Some(key) => key,
                            None => continue,
                        },
                        changed = stop.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            continue;
                        }
                    }
                }
            };

            let looked_up = tokio::select! {
                record = self.lookup(&key) => record,
                _ = stop.changed() => {
                    debug!("Abandoning in-flight lookup for {} after stop", key);
                    break;
                }
            };

            let Some(record) = looked_up else {
                continue;
            };

            if *stop.borrow() {
                debug!("Dropping in-flight result for {} after stop", key);
                break;
            }

            if self.store(&key, record) == RefreshOutcome::Changed {
                needs_redraw = true;
            }
        }

        info!("Contact resolver {} stopped", self.name);
    }
}

struct Slot {
    state: WorkerState,
    generation: u64,
    stop: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Starts and stops resolver runs, one at a time
///
/// Every start creates a fresh task with its own stop flag. A run that is
/// still winding down after `stop` never clobbers the state of a newer run.
pub struct WorkerController {
    slot: Arc<Mutex<Slot>>,
}

impl Default for WorkerController {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerController {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                state: WorkerState::Stopped,
                generation: 0,
                stop: None,
                task: None,
            })),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.slot.lock().state
    }

    /// Spawn a run on `runtime`; returns `false` if one is already active
    pub fn start(&self, runtime: &Handle, worker: ResolverWorker) -> bool {
        let mut slot = self.slot.lock();
        if slot.state.is_active() {
            debug!("Contact resolver already {}", slot.state);
            return false;
        }

        slot.generation += 1;
        let generation = slot.generation;
        slot.state = WorkerState::Starting;
        info!("Starting contact resolver (run {})", generation);

        let (stop_tx, stop_rx) = watch::channel(false);
        slot.stop = Some(stop_tx);

        let shared = self.slot.clone();
        slot.task = Some(runtime.spawn(async move {
            Self::transition(&shared, generation, WorkerState::Starting, WorkerState::Running);
            worker.run(stop_rx).await;
            Self::transition(&shared, generation, WorkerState::Running, WorkerState::Stopped);
            Self::transition(&shared, generation, WorkerState::Stopping, WorkerState::Stopped);
        }));

        true
    }

    /// Signal the active run to stop
    ///
    /// Returns the run's task so callers can wait for it to finish. An
    /// in-flight lookup is abandoned, so the wait is bounded by the poll
    /// interval.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let mut slot = self.slot.lock();
        if !slot.state.is_active() {
            return None;
        }

        slot.state = WorkerState::Stopping;
        info!("Stopping contact resolver (run {})", slot.generation);

        if let Some(stop) = slot.stop.take() {
            let _ = stop.send(true);
        }
        slot.task.take()
    }

    fn transition(slot: &Mutex<Slot>, generation: u64, from: WorkerState, to: WorkerState) {
        let mut slot = slot.lock();
        if slot.generation == generation && slot.state == from {
            debug!("Contact resolver run {}: {} -> {}", generation, from, to);
            slot.state = to;
            if to == WorkerState::Stopped {
                slot.stop = None;
                slot.task = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::ContactInfo;
    use crate::error::{ResolverError, Result};
    use crate::notifier::RedrawListener;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedSource {
        answers: HashMap<String, Option<ContactRecord>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn with(mut self, key: &str, answer: Option<ContactRecord>) -> Self {
            self.answers.insert(key.to_string(), answer);
            self
        }
    }

    #[async_trait]
    impl LookupSource for ScriptedSource {
        async fn resolve(&self, key: &str, _scheme: AddressScheme) -> Result<ContactRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answers.get(key) {
                Some(Some(record)) => Ok(record.clone()),
                Some(None) => Err(ResolverError::LookupFailed("scripted failure".to_string())),
                None if key == "panic" => panic!("directory exploded"),
                None => Ok(ContactRecord::NotFound),
            }
        }
    }

    fn alice() -> ContactRecord {
        ContactRecord::Found(ContactInfo::new(1, "Alice"))
    }

    fn worker(source: ScriptedSource) -> (ResolverWorker, RedrawListener) {
        let (notifier, listener) = RedrawNotifier::channel();
        let worker = ResolverWorker::new(
            "test",
            Arc::new(ExpirableCache::with_capacity(16).unwrap()),
            Arc::new(RefreshQueue::new()),
            Arc::new(source),
            Arc::new(notifier),
            Duration::from_millis(20),
        );
        (worker, listener)
    }

    #[tokio::test]
    async fn test_refresh_reports_change_then_confirmation() {
        let (worker, _listener) = worker(ScriptedSource::default().with("5550100", Some(alice())));

        assert_eq!(worker.refresh("5550100").await, RefreshOutcome::Changed);
        let first_resolved = worker.cache.peek("5550100").unwrap().resolved_at;
        worker.cache.expire_all();
        assert_eq!(worker.refresh("5550100").await, RefreshOutcome::Confirmed);

        let cached = worker.cache.get_cached_value("5550100").unwrap();
        assert!(!cached.is_expired());
        assert!(cached.entry().resolved_at >= first_resolved);
        assert_eq!(cached.value(), &alice());
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_cache_untouched() {
        let (worker, _listener) = worker(ScriptedSource::default().with("5550100", None));
        worker.cache.put("5550100", alice());
        worker.cache.expire_all();

        assert_eq!(worker.refresh("5550100").await, RefreshOutcome::Failed);

        let cached = worker.cache.get_cached_value("5550100").unwrap();
        assert!(cached.is_expired());
        assert_eq!(cached.value(), &alice());
    }

    #[tokio::test]
    async fn test_refresh_survives_panicking_source() {
        let (worker, _listener) = worker(ScriptedSource::default());
        assert_eq!(worker.refresh("panic").await, RefreshOutcome::Failed);
        assert!(worker.cache.peek("panic").is_none());
    }

    #[tokio::test]
    async fn test_not_found_placeholder_is_confirmed_not_changed() {
        let (worker, _listener) = worker(ScriptedSource::default());
        worker.cache.put("5550199", ContactRecord::NotFound);

        assert_eq!(worker.refresh("5550199").await, RefreshOutcome::Confirmed);
    }

    #[tokio::test]
    async fn test_controller_lifecycle() {
        let (worker, mut listener) = worker(ScriptedSource::default().with("5550100", Some(alice())));
        let queue = worker.queue.clone();
        let cache = worker.cache.clone();
        let controller = WorkerController::new();

        assert_eq!(controller.state(), WorkerState::Stopped);
        assert!(controller.start(&Handle::current(), worker.clone()));
        assert!(!controller.start(&Handle::current(), worker.clone()));

        queue.enqueue("5550100");
        assert!(listener.changed_within(Duration::from_secs(2)).await);
        assert_eq!(cache.get_possibly_expired("5550100"), Some(alice()));

        let task = controller.stop().expect("active run");
        assert_eq!(controller.state(), WorkerState::Stopping);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("worker should stop within the poll interval")
            .unwrap();
        assert_eq!(controller.state(), WorkerState::Stopped);
        assert!(controller.stop().is_none());

        assert!(controller.start(&Handle::current(), worker));
    }

    #[test]
    fn test_worker_state_display() {
        assert_eq!(WorkerState::Running.to_string(), "running");
        assert!(WorkerState::Starting.is_active());
        assert!(!WorkerState::Stopping.is_active());
    }
}
