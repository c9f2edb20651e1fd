//! Redraw coalescing and deferred worker start
//!
//! Two scheduling concerns sit between the worker and the rendering path:
//! change signals from the worker are collapsed into at most one pending
//! redraw, and the worker's first start is held back until the first render
//! has settled (or until a row needs data it does not have).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Sending half of the redraw signal
///
/// The channel holds a single slot: while a redraw is pending, further
/// notifications are absorbed into it.
#[derive(Debug)]
pub struct RedrawNotifier {
    tx: mpsc::Sender<()>,
    delivered: AtomicU64,
    coalesced: AtomicU64,
}

/// Receiving half of the redraw signal, held by the rendering layer
#[derive(Debug)]
pub struct RedrawListener {
    rx: mpsc::Receiver<()>,
}

impl RedrawNotifier {
    /// Create a connected notifier/listener pair
    pub fn channel() -> (Self, RedrawListener) {
        let (tx, rx) = mpsc::channel(1);
        let notifier = Self {
            tx,
            delivered: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        };
        (notifier, RedrawListener { rx })
    }

    /// Request a redraw; returns `true` if a new signal was queued
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("Redraw requested");
                true
            }
            Err(TrySendError::Full(())) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                trace!("Redraw already pending, coalescing");
                false
            }
            Err(TrySendError::Closed(())) => {
                trace!("Redraw listener dropped");
                false
            }
        }
    }

    /// Number of signals actually queued
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of signals absorbed by an already pending redraw
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl RedrawListener {
    /// Wait for the next redraw request
    ///
    /// Returns `false` once the resolver has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Consume a pending redraw request without waiting
    pub fn try_changed(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Wait up to `wait` for a redraw request
    pub async fn changed_within(&mut self, wait: Duration) -> bool {
        matches!(tokio::time::timeout(wait, self.rx.recv()).await, Ok(Some(())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// No render pass has been observed since construction or the last reset
    Idle,

    /// A row has been bound; waiting for the render to settle
    Armed,

    /// The start has been requested or scheduled
    Fired,
}

/// One-shot trigger that starts the worker after the first settled render
///
/// Binding a row arms the trigger. Whichever comes first fires it: a render
/// settling (the start is then scheduled after a delay) or an immediate
/// refresh request (the start happens right away). Later renders do not
/// re-arm it; only `reset` does.
///
/// Every scheduled start carries the epoch it was scheduled in. `cancel`
/// moves to a new epoch under the same lock the timer holds while it starts
/// the worker, so a cancelled timer never starts anything.
#[derive(Debug)]
pub struct DeferredStart {
    trigger: Mutex<Trigger>,
    epoch: Mutex<u64>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Default for DeferredStart {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredStart {
    pub fn new() -> Self {
        Self {
            trigger: Mutex::new(Trigger::Idle),
            epoch: Mutex::new(0),
            timer: Mutex::new(None),
        }
    }

    /// Arm the trigger if it is idle; returns `true` if this call armed it
    pub fn arm(&self) -> bool {
        let mut trigger = self.trigger.lock();
        if *trigger == Trigger::Idle {
            *trigger = Trigger::Armed;
            true
        } else {
            false
        }
    }

    /// Fire the trigger if it is armed; returns `true` if this call fired it
    pub fn fire(&self) -> bool {
        let mut trigger = self.trigger.lock();
        if *trigger == Trigger::Armed {
            *trigger = Trigger::Fired;
            true
        } else {
            false
        }
    }

    /// Call `start` with the current epoch after `delay` on the given
    /// runtime, replacing any pending timer
    ///
    /// `start` is expected to hand the epoch back to [`run_if_current`].
    ///
    /// [`run_if_current`]: DeferredStart::run_if_current
    pub fn schedule<F>(&self, runtime: &Handle, delay: Duration, start: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let epoch = *self.epoch.lock();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            start(epoch);
        });

        if let Some(previous) = self.timer.lock().replace(task) {
            previous.abort();
        }
    }

    /// Run `start` unless the start scheduled in `epoch` has been cancelled
    ///
    /// The epoch lock is held while `start` runs.
    pub fn run_if_current<F>(&self, epoch: u64, start: F) -> bool
    where
        F: FnOnce(),
    {
        let current = self.epoch.lock();
        if *current != epoch {
            trace!("Deferred start from epoch {} was cancelled", epoch);
            return false;
        }
        start();
        true
    }

    /// Cancel a scheduled start; returns `true` if one was pending
    pub fn cancel(&self) -> bool {
        *self.epoch.lock() += 1;

        match self.timer.lock().take() {
            Some(task) if !task.is_finished() => {
                task.abort();
                debug!("Cancelled pending deferred start");
                true
            }
            _ => false,
        }
    }

    /// Return to idle so the next bound row arms the trigger again
    ///
    /// A start that is already scheduled still happens.
    pub fn reset(&self) {
        *self.trigger.lock() = Trigger::Idle;
    }
}
