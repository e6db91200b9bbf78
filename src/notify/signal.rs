//! Multi-waiter readiness signal.
//!
//! The signal pairs an [`EventCounter`] with a wake epoch. Waiters snapshot
//! the epoch *before* checking their predicate and then wait for it to move,
//! which closes the window between "predicate false" and "start waiting":
//!
//! ```text
//! producer                         waiter
//! --------                         ------
//! counter.increment()              seen = epoch()          (acquire)
//! epoch += 1        (release)      if predicate() -> done
//!                                  wait_for_change(seen)
//! ```
//!
//! If the waiter's snapshot predates the bump it will observe the change; if
//! it postdates it, the acquire load makes the dirty flag visible and the
//! predicate succeeds. Wakeups are broadcast; every waiter re-checks.

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::config::RelaxFn;
use crate::counter::EventCounter;

/// Why [`ReadinessSignal::wait_for_change`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The epoch moved; re-check the predicate.
    Changed,
    /// The abort condition fired first.
    Aborted,
}

/// Broadcast readiness notification for one device instance.
pub struct ReadinessSignal {
    counter: EventCounter,
    epoch: AtomicU64,
    waiters: AtomicUsize,
    closed: AtomicBool,
    relax: RelaxFn,
}

impl ReadinessSignal {
    /// Creates an open signal with no pending event.
    pub fn new(relax: RelaxFn) -> Self {
        Self {
            counter: EventCounter::new(),
            epoch: AtomicU64::new(0),
            waiters: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            relax,
        }
    }

    /// The underlying counter.
    #[inline]
    pub fn counter(&self) -> &EventCounter {
        &self.counter
    }

    /// Counts an event, marks it unread and wakes every waiter.
    ///
    /// Returns the new press count.
    pub fn record_event(&self) -> u64 {
        let count = self.counter.increment();
        self.wake_all();
        count
    }

    /// Clears the unread flag. Returns whether an event was pending.
    ///
    /// Callers serialize this through the instance lock.
    #[inline]
    pub fn consume(&self) -> bool {
        self.counter.take_dirty()
    }

    /// Non-mutating readiness check.
    #[inline]
    pub fn peek_ready(&self) -> bool {
        self.counter.is_dirty()
    }

    /// Current wake epoch. Snapshot this before evaluating a wait predicate.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Wakes every waiter so they re-evaluate their predicates.
    #[inline]
    pub fn wake_all(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
    }

    /// Marks the signal closed and wakes everyone. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake_all();
    }

    /// Whether [`Self::close`] was called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of callers currently inside [`Self::wait_for_change`].
    #[inline]
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    /// Waits until the epoch differs from `seen` or `abort` returns true.
    ///
    /// Must be called without holding the instance lock.
    pub fn wait_for_change<F>(&self, seen: u64, mut abort: F) -> WaitOutcome
    where
        F: FnMut() -> bool,
    {
        let _waiter = WaiterGuard::enter(&self.waiters);
        loop {
            if self.epoch.load(Ordering::Acquire) != seen {
                return WaitOutcome::Changed;
            }
            if abort() {
                return WaitOutcome::Aborted;
            }
            (self.relax)();
        }
    }
}

impl core::fmt::Debug for ReadinessSignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadinessSignal")
            .field("count", &self.counter.get())
            .field("ready", &self.peek_ready())
            .field("epoch", &self.epoch())
            .field("waiters", &self.waiters())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn enter(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::AcqRel);
        Self(waiters)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
