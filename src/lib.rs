#![no_std]

//! # Interrupt-Driven Event Devices
//!
//! This crate turns edge triggers from a GPIO-like line into pollable,
//! controllable character-style devices. It is designed for `no_std`
//! environments and uses the `alloc` crate for dynamic memory allocation.
//!
//! ## Architecture
//!
//! The module is organized into multiple layers:
//!
//! ### Restricted context (top half)
//! - [`EventSource`]: Filters the edge, stashes its timestamp and schedules deferred work
//! - [`SharedLine`]: Simulated shared trigger line asking every attached source in turn
//! - [`DeferredWorkQueue`]: Lock-free coalescing queue, at most one pending job per instance
//!
//! ### Schedulable context (bottom half)
//! - [`DeviceInstance`]: Debounce, counting, actuator and read/write/control state
//! - [`ReadinessSignal`]: Broadcast wakeup for blocked readers and pollers
//! - [`InstanceLifecycle`]: State machine for teardown (Live/Draining/Gone)
//!
//! ### High-Level API
//! - [`EventDevices`]: Probe, remove, open and the deferred work pass
//! - [`InstanceRegistry`]: Fixed-capacity slot arena indexed by [`InstanceId`]
//! - [`ClientHandle`]: One client's open session on an instance
//! - [`ControlCommand`]: The out-of-band command set
//!
//! ## Data Flow
//!
//! ```text
//! trigger ─> EventSource ─> DeferredWorkQueue ─> run_deferred()
//!                                                     │
//!                         debounce, count, actuator ◄─┘
//!                                     │
//!                      ReadinessSignal::record_event()
//!                                     │
//!               blocked read() / poll_wait() wake and re-check
//! ```
//!
//! ## Examples
//!
//! ```rust,ignore
//! use alloc::sync::Arc;
//! use axeventdev::{
//!     ControlCommand, DriverConfig, Edge, EventDevices, InstanceConfig, ManualClock, SharedLine,
//! };
//!
//! let clock = Arc::new(ManualClock::new());
//! let devices = EventDevices::new(DriverConfig::new(), clock.clone());
//! let line = Arc::new(SharedLine::new(17));
//!
//! // Probe: allocate a slot and attach to the trigger line
//! let id = devices.probe(InstanceConfig::new(17), line.clone(), None)?;
//! let handle = devices.open(id)?;
//!
//! // Interrupt path, then the worker
//! line.fire(Edge::Falling);
//! devices.run_deferred();
//!
//! assert_eq!(handle.read(false)?, "Press Count: 1\n");
//! handle.control(ControlCommand::ResetCounter.into())?;
//!
//! // Hot-unplug: blocked readers get DeviceGone
//! devices.remove(id)?;
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod clock;
mod config;
mod control;
mod counter;
mod device;
mod error;
mod handle;
mod instance;
mod lifecycle;
mod line;
mod notify;
mod registry;
mod source;
mod work;

/// Maximum number of device instances one driver can hold.
pub const MAX_DEVICES: usize = 8;

pub use clock::{Clock, ManualClock};
pub use config::{
    ActuatorPolicy, DriverConfig, InstanceConfig, RelaxFn, TriggerPolarity, WritePolicy,
    DEFAULT_DEBOUNCE,
};
pub use control::{ControlCommand, ControlRequest, ControlResponse};
pub use counter::EventCounter;
pub use device::EventDevices;
pub use error::{DevError, DevResult};
pub use handle::ClientHandle;
pub use instance::{
    snapshot_line, Actuator, DeferredOutcome, DeviceInstance, InstanceStatus, ReadState,
};
pub use lifecycle::{AccessGuard, InstanceLifecycle, LifecycleState};
pub use line::SharedLine;
pub use notify::{PollEvents, ReadinessSignal, WaitOutcome};
pub use registry::{InstanceId, InstanceRegistry};
pub use source::{
    Edge, EventSource, IrqReturn, TriggerBatch, TriggerBinding, DRAIN_CAPACITY, TRIGGER_BACKLOG,
};
pub use work::{DeferredWorkQueue, KickFn};
