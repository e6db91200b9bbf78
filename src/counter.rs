//! Lock-free per-instance event counter.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Press counter plus the "unread event" flag.
///
/// The count only moves forward except through [`EventCounter::reset`].
/// The dirty flag is published with release ordering after the count, so a
/// reader that acquires `dirty == true` also sees the matching count.
#[derive(Debug, Default)]
pub struct EventCounter {
    count: AtomicU64,
    dirty: AtomicBool,
}

impl EventCounter {
    /// A zeroed counter with no unread event.
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Counts one event and marks it unread. Returns the new count.
    #[inline]
    pub fn increment(&self) -> u64 {
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        self.dirty.store(true, Ordering::Release);
        count
    }

    /// Current count.
    #[inline]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Zeroes the count. Leaves the dirty flag alone.
    #[inline]
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    /// Whether an unread event exists.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clears the dirty flag, returning its previous value.
    #[inline]
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}
