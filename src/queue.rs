//! Deduplicated FIFO of numbers awaiting resolution
//!
//! Requests are processed in order of first enqueue. A number that is already
//! pending is not queued twice and keeps its original position; once the
//! worker pops it, it can be queued again.

use crate::cache::types::CacheKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::trace;

/// How urgently a refresh is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Nothing is cached for the number; may start the worker right away
    Immediate,

    /// A stale value is being shown; refreshing can wait for the worker
    Deferred,
}

/// A request to resolve one number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub key: CacheKey,
    pub priority: Priority,
}

impl RefreshRequest {
    pub fn immediate(key: impl Into<CacheKey>) -> Self {
        Self {
            key: key.into(),
            priority: Priority::Immediate,
        }
    }

    pub fn deferred(key: impl Into<CacheKey>) -> Self {
        Self {
            key: key.into(),
            priority: Priority::Deferred,
        }
    }
}

#[derive(Default)]
struct Pending {
    order: VecDeque<CacheKey>,
    members: HashSet<CacheKey>,
}

/// Queue of pending refreshes shared by the binder and the worker
#[derive(Default)]
pub struct RefreshQueue {
    pending: Mutex<Pending>,
    available: Notify,
}

impl RefreshQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a number; returns `false` if it was already pending
    pub fn enqueue(&self, key: impl Into<CacheKey>) -> bool {
        let key = key.into();

        let added = {
            let mut pending = self.pending.lock();
            if pending.members.insert(key.clone()) {
                pending.order.push_back(key);
                true
            } else {
                false
            }
        };

        if added {
            // Stores a permit when no one is waiting, so the wakeup is not lost
            self.available.notify_one();
        }
        added
    }

    /// Pop the oldest pending number without waiting
    pub fn try_dequeue(&self) -> Option<CacheKey> {
        let mut pending = self.pending.lock();
        let key = pending.order.pop_front()?;
        pending.members.remove(&key);
        Some(key)
    }

    /// Pop the oldest pending number, waiting up to `wait` for one to arrive
    ///
    /// The lock is released while waiting. Returns `None` when the wait
    /// elapses with nothing queued.
    pub async fn dequeue_blocking(&self, wait: Duration) -> Option<CacheKey> {
        let deadline = Instant::now() + wait;

        loop {
            if let Some(key) = self.try_dequeue() {
                return Some(key);
            }

            if timeout_at(deadline, self.available.notified()).await.is_err() {
                trace!("Refresh queue idle for {:?}", wait);
                return self.try_dequeue();
            }
        }
    }

    /// Check if a number is waiting to be resolved
    pub fn contains(&self, key: &str) -> bool {
        self.pending.lock().members.contains(key)
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.pending.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_enqueue_deduplicates() {
        let queue = RefreshQueue::new();

        assert!(queue.enqueue("5550100"));
        assert!(!queue.enqueue("5550100"));
        assert!(queue.enqueue("5550199"));
        assert!(!queue.enqueue("5550100"));

        assert_eq!(queue.len(), 2);
        assert!(queue.contains("5550100"));
    }

    #[test]
    fn test_fifo_order_of_first_enqueue() {
        let queue = RefreshQueue::new();
        queue.enqueue("a");
        queue.enqueue("b");
        queue.enqueue("a");
        queue.enqueue("c");

        assert_eq!(queue.try_dequeue().as_deref(), Some("a"));
        assert_eq!(queue.try_dequeue().as_deref(), Some("b"));
        assert_eq!(queue.try_dequeue().as_deref(), Some("c"));
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn test_requeue_after_dequeue() {
        let queue = RefreshQueue::new();
        queue.enqueue("a");
        assert_eq!(queue.try_dequeue().as_deref(), Some("a"));

        assert!(!queue.contains("a"));
        assert!(queue.enqueue("a"));
    }

    #[test]
    fn test_request_constructors() {
        assert_eq!(RefreshRequest::immediate("a").priority, Priority::Immediate);
        assert_eq!(RefreshRequest::deferred("a").priority, Priority::Deferred);
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = RefreshQueue::new();

        let started = Instant::now();
        let key = queue.dequeue_blocking(Duration::from_millis(30)).await;

        assert!(key.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(RefreshQueue::new());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue_blocking(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue("5550100");

        let key = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake before its own deadline")
            .unwrap();
        assert_eq!(key.as_deref(), Some("5550100"));
    }

    #[tokio::test]
    async fn test_enqueue_before_wait_is_not_lost() {
        let queue = RefreshQueue::new();
        queue.enqueue("a");
        assert_eq!(queue.try_dequeue().as_deref(), Some("a"));

        // The stored permit wakes the wait immediately; the queue is empty, so
        // the loop waits again until the deadline
        let key = queue.dequeue_blocking(Duration::from_millis(20)).await;
        assert!(key.is_none());
    }

    #[tokio::test]
    async fn test_parked_wait_is_woken_by_enqueue() {
        let queue = RefreshQueue::new();
        let mut wait = tokio_test::task::spawn(queue.dequeue_blocking(Duration::from_secs(30)));
        tokio_test::assert_pending!(wait.poll());

        queue.enqueue("5550100");
        assert!(wait.is_woken());
        let key = tokio_test::assert_ready!(wait.poll());
        assert_eq!(key.as_deref(), Some("5550100"));
    }
}
