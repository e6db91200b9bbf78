//! Readiness notification for blocked and polling consumers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ deferred handler │ accepted event
//! └────────┬─────────┘
//!          │ record_event()
//!          ▼
//! ┌──────────────────┐
//! │ ReadinessSignal  │ EventCounter + wake epoch
//! └────────┬─────────┘
//!          │ wake_all()
//!          ▼
//! ┌──────────────────┐
//! │ readers/pollers  │ re-check predicate, consume or compute PollEvents
//! └──────────────────┘
//! ```
//!
//! Every wakeup is a broadcast. Waiters never hold the instance lock while
//! waiting and always re-check their predicate after waking.

mod poll;
mod signal;

pub use poll::PollEvents;
pub use signal::{ReadinessSignal, WaitOutcome};
