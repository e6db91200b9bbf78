//! Instance lifecycle with race-free access tracking.
//!
//! A single `AtomicU32` holds both the lifecycle state and the number of
//! in-flight accesses, so "is the instance live?" and "count me in" happen in
//! one CAS. Teardown can then flip the state and wait for the count to drain
//! without a window where a new access slips in.
//!
//! Layout: `[state(8 bits) | access_count(24 bits)]`

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::RelaxFn;

/// Lifecycle states of a device instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Serving reads, writes, controls and deferred jobs.
    Live = 0,
    /// Teardown started; new accesses are refused.
    Draining = 1,
    /// Torn down. The slot may be released.
    Gone = 2,
}

impl LifecycleState {
    const fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::Live,
            1 => Self::Draining,
            _ => Self::Gone,
        }
    }
}

const STATE_SHIFT: u32 = 24;
const COUNT_MASK: u32 = (1 << STATE_SHIFT) - 1;

#[inline]
const fn pack(state: LifecycleState, count: u32) -> u32 {
    ((state as u32) << STATE_SHIFT) | count
}

/// Lifecycle tracker for one device instance.
///
/// ```text
/// ┌──────┐ begin_teardown() ┌──────────┐ wait_idle() + finish() ┌──────┐
/// │ Live │ ───────────────> │ Draining │ ─────────────────────> │ Gone │
/// └──────┘                  └──────────┘                        └──────┘
/// ```
pub struct InstanceLifecycle {
    word: AtomicU32,
}

impl InstanceLifecycle {
    /// A live instance with no access in flight.
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(pack(LifecycleState::Live, 0)),
        }
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_bits(self.word.load(Ordering::Acquire) >> STATE_SHIFT)
    }

    /// Number of accesses currently in flight.
    #[inline]
    pub fn active_accesses(&self) -> u32 {
        self.word.load(Ordering::Acquire) & COUNT_MASK
    }

    /// Whether new accesses are accepted.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.state() == LifecycleState::Live
    }

    /// Registers an access if the instance is live.
    ///
    /// The returned guard ends the access when dropped.
    pub fn try_access(&self) -> Option<AccessGuard<'_>> {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            if current >> STATE_SHIFT != LifecycleState::Live as u32 {
                return None;
            }
            let count = current & COUNT_MASK;
            if count == COUNT_MASK {
                return None;
            }
            match self.word.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(AccessGuard { lifecycle: self }),
                Err(actual) => current = actual,
            }
        }
    }

    /// Moves `Live` to `Draining`. Returns `false` if teardown already began.
    pub fn begin_teardown(&self) -> bool {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            if current >> STATE_SHIFT != LifecycleState::Live as u32 {
                return false;
            }
            let next = pack(LifecycleState::Draining, current & COUNT_MASK);
            match self.word.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Spins (through `relax`) until no access is in flight.
    pub fn wait_idle(&self, relax: RelaxFn) {
        while self.active_accesses() != 0 {
            relax();
        }
    }

    /// Marks the instance `Gone`. Call after [`Self::wait_idle`].
    pub fn finish(&self) {
        self.word
            .store(pack(LifecycleState::Gone, 0), Ordering::Release);
    }

    fn end_access(&self) {
        self.word.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for InstanceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for InstanceLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InstanceLifecycle")
            .field("state", &self.state())
            .field("active_accesses", &self.active_accesses())
            .finish()
    }
}

/// An in-flight access. Dropping it ends the access.
pub struct AccessGuard<'a> {
    lifecycle: &'a InstanceLifecycle,
}

impl AccessGuard<'_> {
    /// Whether teardown has started since the access began.
    #[inline]
    pub fn teardown_pending(&self) -> bool {
        !self.lifecycle.is_live()
    }
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.end_access();
    }
}
