//! Deferred work dispatch from the restricted context to the schedulable one.
//!
//! Each instance owns one bit in the "pending" half and one bit in the
//! "running" half of a single atomic word:
//!
//! ```text
//! bit:   31 ........ 16 15 ......... 0
//!        [ running ids ][ pending ids ]
//! ```
//!
//! Scheduling is a `fetch_or`, so it never blocks and a second schedule for
//! an already pending instance is a no-op. A worker claims a job by moving
//! its bit from pending to running in one CAS, which lets teardown cancel a
//! job and then wait for a claimed one without a gap in between.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::RelaxFn;
use crate::registry::InstanceId;
use crate::MAX_DEVICES;

const RUNNING_SHIFT: u32 = 16;
const PENDING_MASK: u32 = (1 << RUNNING_SHIFT) - 1;

const _: () = assert!(MAX_DEVICES <= RUNNING_SHIFT as usize);

/// Callback run when a job goes from idle to pending.
///
/// Runs in the restricted context: it must only poke the host's worker
/// (set a flag, unpark a thread), never block.
pub type KickFn = Arc<dyn Fn() + Send + Sync>;

/// Zero for ids outside the slot range, so they can never touch another
/// instance's bits.
#[inline]
const fn pending_bit(id: InstanceId) -> u32 {
    if id.0 < MAX_DEVICES { 1 << id.0 } else { 0 }
}

#[inline]
const fn running_bit(id: InstanceId) -> u32 {
    pending_bit(id) << RUNNING_SHIFT
}

/// Coalescing queue with at most one pending job per instance.
pub struct DeferredWorkQueue {
    bits: AtomicU32,
    kick: Option<KickFn>,
    scheduled: AtomicU64,
    coalesced: AtomicU64,
}

impl DeferredWorkQueue {
    /// An empty queue without kick.
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            kick: None,
            scheduled: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Creates a queue that calls `kick` whenever a new job is queued.
    pub fn with_kick(kick: KickFn) -> Self {
        Self {
            kick: Some(kick),
            ..Self::new()
        }
    }

    /// Queues a job for `id`. Restricted-context safe.
    ///
    /// Returns `true` if the job was newly queued, `false` if one was
    /// already pending and this request was coalesced into it. Ids at or
    /// above [`MAX_DEVICES`] are never queued.
    pub fn schedule(&self, id: InstanceId) -> bool {
        let bit = pending_bit(id);
        if bit == 0 {
            return false;
        }
        let prev = self.bits.fetch_or(bit, Ordering::AcqRel);
        if prev & bit != 0 {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        if let Some(kick) = &self.kick {
            kick();
        }
        true
    }

    /// Claims the lowest pending job whose instance is not already running.
    pub fn claim_next(&self) -> Option<InstanceId> {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let claimable = current & PENDING_MASK & !(current >> RUNNING_SHIFT);
            if claimable == 0 {
                return None;
            }
            let id = InstanceId(claimable.trailing_zeros() as usize);
            let next = (current & !pending_bit(id)) | running_bit(id);
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(id),
                Err(actual) => current = actual,
            }
        }
    }

    /// Marks a claimed job finished.
    pub fn complete(&self, id: InstanceId) {
        self.bits.fetch_and(!running_bit(id), Ordering::AcqRel);
    }

    /// Drops a pending job for `id` and waits for a running one to finish.
    ///
    /// Returns whether a pending job was dropped.
    pub fn cancel_sync(&self, id: InstanceId, relax: RelaxFn) -> bool {
        let prev = self.bits.fetch_and(!pending_bit(id), Ordering::AcqRel);
        while self.is_running(id) {
            relax();
        }
        prev & pending_bit(id) != 0
    }

    /// Whether a job for `id` waits to be claimed.
    #[inline]
    pub fn is_pending(&self, id: InstanceId) -> bool {
        self.bits.load(Ordering::Acquire) & pending_bit(id) != 0
    }

    /// Whether a job for `id` is claimed and not yet complete.
    #[inline]
    pub fn is_running(&self, id: InstanceId) -> bool {
        self.bits.load(Ordering::Acquire) & running_bit(id) != 0
    }

    /// Whether any job is waiting to be claimed.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.bits.load(Ordering::Acquire) & PENDING_MASK != 0
    }

    /// Number of schedule requests that queued a new job.
    pub fn scheduled_count(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    /// Number of schedule requests folded into an already pending job.
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl Default for DeferredWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DeferredWorkQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let bits = self.bits.load(Ordering::Acquire);
        f.debug_struct("DeferredWorkQueue")
            .field("pending", &format_args!("{:#06x}", bits & PENDING_MASK))
            .field("running", &format_args!("{:#06x}", bits >> RUNNING_SHIFT))
            .field("scheduled", &self.scheduled_count())
            .field("coalesced", &self.coalesced_count())
            .finish()
    }
}
