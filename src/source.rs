//! Restricted-context entry point for trigger edges.
//!
//! [`EventSource::on_trigger`] is what the trigger layer calls from its
//! interrupt path. It does three bounded things: filter the edge, stash the
//! timestamp, and schedule the owning instance's deferred job. Counting,
//! debounce and wakeups all happen later in the schedulable context.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::time::Duration;

use arrayvec::ArrayVec;
use axerrno::AxResult;
use spin::Mutex;

use crate::clock::{duration_to_nanos, Clock};
use crate::config::TriggerPolarity;
use crate::registry::InstanceId;
use crate::work::DeferredWorkQueue;

/// Number of trigger timestamps buffered per instance between deferred runs.
pub const TRIGGER_BACKLOG: usize = 16;

/// Backlog plus the overflow cell.
pub const DRAIN_CAPACITY: usize = TRIGGER_BACKLOG + 1;

/// Timestamps handed to the deferred handler, oldest first.
pub type TriggerBatch = ArrayVec<Duration, DRAIN_CAPACITY>;

/// Direction of a line transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl TriggerPolarity {
    /// Whether `edge` is one this polarity reacts to.
    #[inline]
    pub const fn accepts(self, edge: Edge) -> bool {
        matches!(
            (self, edge),
            (Self::Both, _) | (Self::Rising, Edge::Rising) | (Self::Falling, Edge::Falling)
        )
    }
}

/// Answer given to the trigger-dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The trigger was not for this source (or the source is detached).
    None,
    /// The trigger was claimed and deferred work is scheduled.
    Handled,
}

impl IrqReturn {
    /// Whether the trigger was claimed.
    #[inline]
    pub fn is_handled(self) -> bool {
        self == Self::Handled
    }
}

/// Host-side trigger attachment, e.g. `request_irq`/`free_irq` or a
/// simulated line.
pub trait TriggerBinding: Send + Sync {
    /// Starts delivering triggers to `source`.
    fn attach(&self, source: Arc<EventSource>) -> AxResult;

    /// Stops delivering triggers to the source of instance `id`.
    ///
    /// After this returns no further `on_trigger` call may start.
    fn detach(&self, id: InstanceId);
}

/// Restricted-context half of a device instance.
pub struct EventSource {
    id: InstanceId,
    polarity: TriggerPolarity,
    attached: AtomicBool,
    backlog: Mutex<ArrayVec<u64, TRIGGER_BACKLOG>>,
    /// Newest timestamp that did not fit the backlog, stored as `nanos + 1`
    /// so that zero means empty.
    overflow_cell: AtomicU64,
    overflowed: AtomicU64,
    handled: AtomicU64,
    queue: Arc<DeferredWorkQueue>,
    clock: Arc<dyn Clock>,
}

impl EventSource {
    /// Creates a detached source for instance `id`.
    pub fn new(
        id: InstanceId,
        polarity: TriggerPolarity,
        queue: Arc<DeferredWorkQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id,
            polarity,
            attached: AtomicBool::new(false),
            backlog: Mutex::new(ArrayVec::new()),
            overflow_cell: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
            handled: AtomicU64::new(0),
            queue,
            clock,
        }
    }

    /// Owning instance.
    #[inline]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Edge filter of this source.
    #[inline]
    pub fn polarity(&self) -> TriggerPolarity {
        self.polarity
    }

    /// Handles a trigger, timestamping it with the instance clock.
    #[inline]
    pub fn on_trigger(&self, edge: Edge) -> IrqReturn {
        self.on_trigger_at(edge, self.clock.now())
    }

    /// Handles a trigger whose timestamp was captured by the trigger layer.
    ///
    /// Never blocks and never allocates. If the backlog is busy or full the
    /// newest timestamp survives in the overflow cell, so a burst is folded
    /// into the pending job rather than lost.
    pub fn on_trigger_at(&self, edge: Edge, at: Duration) -> IrqReturn {
        if !self.attached.load(Ordering::Acquire) || !self.polarity.accepts(edge) {
            return IrqReturn::None;
        }

        let stamp = duration_to_nanos(at);
        let stored = match self.backlog.try_lock() {
            Some(mut backlog) => backlog.try_push(stamp).is_ok(),
            None => false,
        };
        if !stored {
            self.overflow_cell
                .fetch_max(stamp.saturating_add(1), Ordering::AcqRel);
            self.overflowed.fetch_add(1, Ordering::Relaxed);
        }

        self.handled.fetch_add(1, Ordering::Relaxed);
        self.queue.schedule(self.id);
        IrqReturn::Handled
    }

    /// Takes every buffered timestamp, oldest first. Schedulable context only.
    pub fn drain(&self) -> TriggerBatch {
        let mut stamps: ArrayVec<u64, DRAIN_CAPACITY> = ArrayVec::new();
        {
            let mut backlog = self.backlog.lock();
            stamps.extend(backlog.drain(..));
        }
        let late = self.overflow_cell.swap(0, Ordering::AcqRel);
        if late != 0 {
            stamps.push(late - 1);
        }
        stamps.sort_unstable();
        stamps.into_iter().map(Duration::from_nanos).collect()
    }

    /// Triggers that did not fit the backlog.
    pub fn overflow_count(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Triggers claimed by this source.
    pub fn handled_count(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Whether triggers are currently accepted.
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::Release);
    }
}

impl core::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventSource")
            .field("id", &self.id)
            .field("polarity", &self.polarity)
            .field("attached", &self.is_attached())
            .field("handled", &self.handled_count())
            .field("overflowed", &self.overflow_count())
            .finish()
    }
}
