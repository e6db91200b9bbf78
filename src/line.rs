//! Simulated shared trigger line.
//!
//! Stands in for an interrupt line with several registered handlers: every
//! attached source is asked in turn and the line reports whether anyone
//! claimed the edge.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use arrayvec::ArrayVec;
use axerrno::{ax_err, AxResult};
use spin::RwLock;

use crate::registry::InstanceId;
use crate::source::{Edge, EventSource, IrqReturn, TriggerBinding};
use crate::MAX_DEVICES;

/// A trigger line that can be shared by up to [`MAX_DEVICES`] sources.
pub struct SharedLine {
    line: u32,
    sources: RwLock<ArrayVec<Arc<EventSource>, MAX_DEVICES>>,
    spurious: AtomicU64,
}

impl SharedLine {
    /// A line with no source attached.
    pub fn new(line: u32) -> Self {
        Self {
            line,
            sources: RwLock::new(ArrayVec::new()),
            spurious: AtomicU64::new(0),
        }
    }

    /// Line number.
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Delivers an edge to every attached source.
    pub fn fire(&self, edge: Edge) -> IrqReturn {
        let sources = self.sources.read();
        let handled = sources
            .iter()
            .fold(false, |handled, source| source.on_trigger(edge).is_handled() || handled);
        if handled {
            IrqReturn::Handled
        } else {
            self.spurious.fetch_add(1, Ordering::Relaxed);
            IrqReturn::None
        }
    }

    /// Number of attached sources.
    pub fn attached(&self) -> usize {
        self.sources.read().len()
    }

    /// Edges nobody claimed.
    pub fn spurious_count(&self) -> u64 {
        self.spurious.load(Ordering::Relaxed)
    }
}

impl TriggerBinding for SharedLine {
    fn attach(&self, source: Arc<EventSource>) -> AxResult {
        let mut sources = self.sources.write();
        if sources.iter().any(|s| s.id() == source.id()) {
            return ax_err!(AlreadyExists, "source already attached to line");
        }
        if sources.try_push(source).is_err() {
            return ax_err!(ResourceBusy, "shared line is full");
        }
        trace!("line {}: {} source(s) attached", self.line, sources.len());
        Ok(())
    }

    fn detach(&self, id: InstanceId) {
        self.sources.write().retain(|s| s.id() != id);
    }
}

impl core::fmt::Debug for SharedLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedLine")
            .field("line", &self.line)
            .field("attached", &self.attached())
            .field("spurious", &self.spurious_count())
            .finish()
    }
}
