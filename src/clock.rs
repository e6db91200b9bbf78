//! Monotonic time source used for trigger timestamps and debounce.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

/// Monotonic clock supplied by the host.
///
/// `now` is called from the restricted context, so implementations must be
/// bounded and must not block.
pub trait Clock: Send + Sync {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// A clock that only moves when told to.
///
/// Useful for simulated trigger sources and deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Starts at time zero.
    pub const fn new() -> Self {
        Self {
            nanos: AtomicU64::new(0),
        }
    }

    /// Jumps to an absolute time. Going backwards is allowed but callers
    /// should not rely on it.
    pub fn set(&self, at: Duration) {
        self.nanos.store(duration_to_nanos(at), Ordering::Release);
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(duration_to_nanos(delta), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// Saturating conversion into whole nanoseconds.
#[inline]
pub(crate) fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
