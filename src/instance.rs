//! One logical event device: counter, readiness, actuator and configuration.
//!
//! Two orthogonal state axes live here:
//!
//! ```text
//! read axis:     Idle ──record_event()──> Ready ──read()──> Idle
//! actuator axis: Off <──write("1") / FORCE_ON / FORCE_OFF / accepted event──> On
//! ```
//!
//! The counter and the ready flag are lock-free (see [`ReadinessSignal`]);
//! everything else is guarded by the instance mutex. Blocking calls drop the
//! mutex while they wait and re-take it to re-check, so the deferred handler
//! can always make progress.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;

use spin::Mutex;

use crate::config::{ActuatorPolicy, InstanceConfig, RelaxFn, TriggerPolarity, WritePolicy};
use crate::control::{ControlCommand, ControlResponse};
use crate::error::{DevError, DevResult};
use crate::lifecycle::{InstanceLifecycle, LifecycleState};
use crate::notify::{PollEvents, ReadinessSignal};
use crate::registry::InstanceId;
use crate::source::EventSource;

/// Output driven by the instance, e.g. an LED on a GPIO line.
pub trait Actuator: Send + Sync {
    /// Sets the physical output. Called from schedulable context only.
    fn drive(&self, on: bool);
}

/// Position on the read axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// No unread event.
    Idle,
    /// An event is waiting to be read.
    Ready,
}

/// Result of one deferred job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeferredOutcome {
    /// Triggers that passed debounce and were counted.
    pub accepted: u32,
    /// Triggers dropped by debounce.
    pub ignored: u32,
}

struct InstanceState {
    actuator_on: bool,
    notify_enabled: bool,
    write_pending: bool,
    last_event: Option<Duration>,
}

#[derive(Debug, Default)]
struct InstanceStats {
    accepted: AtomicU64,
    ignored: AtomicU64,
    overflow_seen: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
}

/// Renders the read payload for a given press count.
pub fn snapshot_line(press_count: u64) -> String {
    format!("Press Count: {}\n", press_count)
}

/// A device instance. Owned by the registry, borrowed by client handles.
pub struct DeviceInstance {
    id: InstanceId,
    config: InstanceConfig,
    source: Arc<EventSource>,
    signal: ReadinessSignal,
    lifecycle: InstanceLifecycle,
    actuator: Option<Arc<dyn Actuator>>,
    state: Mutex<InstanceState>,
    stats: InstanceStats,
    open_handles: AtomicUsize,
    relax: RelaxFn,
}

impl DeviceInstance {
    /// Builds an instance around an already created event source.
    ///
    /// The actuator, if any, is driven to its initial "off" state.
    pub fn new(
        config: InstanceConfig,
        source: Arc<EventSource>,
        actuator: Option<Arc<dyn Actuator>>,
        relax: RelaxFn,
    ) -> Self {
        if let Some(actuator) = &actuator {
            actuator.drive(false);
        }
        Self {
            id: source.id(),
            state: Mutex::new(InstanceState {
                actuator_on: false,
                notify_enabled: config.notify_enabled,
                write_pending: false,
                last_event: None,
            }),
            config,
            source,
            signal: ReadinessSignal::new(relax),
            lifecycle: InstanceLifecycle::new(),
            actuator,
            stats: InstanceStats::default(),
            open_handles: AtomicUsize::new(0),
            relax,
        }
    }

    /// Slot index of this instance.
    #[inline]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Configuration given at probe time.
    #[inline]
    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// Restricted-context half of the instance.
    #[inline]
    pub fn source(&self) -> &Arc<EventSource> {
        &self.source
    }

    /// Readiness signal shared by readers and pollers.
    #[inline]
    pub fn signal(&self) -> &ReadinessSignal {
        &self.signal
    }

    /// Teardown state and in-flight access count.
    #[inline]
    pub fn lifecycle(&self) -> &InstanceLifecycle {
        &self.lifecycle
    }

    /// Accepted events since probe or the last reset.
    #[inline]
    pub fn press_count(&self) -> u64 {
        self.signal.counter().get()
    }

    /// Whether an unread event is waiting.
    pub fn read_state(&self) -> ReadState {
        if self.signal.peek_ready() {
            ReadState::Ready
        } else {
            ReadState::Idle
        }
    }

    /// Last state driven to the actuator. Always `false` without one.
    pub fn actuator_on(&self) -> bool {
        self.state.lock().actuator_on
    }

    /// Whether an actuator was attached at probe time.
    pub fn has_actuator(&self) -> bool {
        self.actuator.is_some()
    }

    /// Whether readiness is surfaced to pollers.
    pub fn notify_enabled(&self) -> bool {
        self.state.lock().notify_enabled
    }

    /// Whether teardown has started or finished.
    #[inline]
    pub fn is_gone(&self) -> bool {
        self.signal.is_closed() || !self.lifecycle.is_live()
    }

    /// Deferred handler: debounces buffered triggers and records the
    /// accepted ones, oldest first.
    ///
    /// Has no error path back to the trigger source; a job racing teardown
    /// is logged and dropped.
    pub fn process_deferred(&self) -> DeferredOutcome {
        let Some(_access) = self.lifecycle.try_access() else {
            warn!("gpioevt{}: dropping deferred job, device is going away", self.id);
            return DeferredOutcome::default();
        };

        let batch = self.source.drain();
        let overflowed = self.source.overflow_count();
        let seen = self.stats.overflow_seen.swap(overflowed, Ordering::Relaxed);
        if overflowed > seen {
            warn!(
                "gpioevt{}: trigger backlog overflowed {} time(s)",
                self.id,
                overflowed - seen
            );
        }

        let mut outcome = DeferredOutcome::default();
        if batch.is_empty() {
            return outcome;
        }

        let mut state = self.state.lock();
        for at in batch {
            let bounced = match state.last_event {
                Some(last) => at.saturating_sub(last) < self.config.debounce,
                None => false,
            };
            if bounced {
                outcome.ignored += 1;
                debug!("gpioevt{}: bounce ignored at {:?}", self.id, at);
                continue;
            }

            state.last_event = Some(at);
            if self.actuator.is_some() {
                match self.config.actuator_policy {
                    ActuatorPolicy::Ignore => {}
                    ActuatorPolicy::Toggle => {
                        let on = !state.actuator_on;
                        self.set_actuator(&mut state, on);
                    }
                    ActuatorPolicy::SetOn => self.set_actuator(&mut state, true),
                }
            }
            let count = self.signal.record_event();
            outcome.accepted += 1;
            debug!("gpioevt{}: press accepted, press_count={}", self.id, count);
        }
        drop(state);

        self.stats
            .accepted
            .fetch_add(u64::from(outcome.accepted), Ordering::Relaxed);
        self.stats
            .ignored
            .fetch_add(u64::from(outcome.ignored), Ordering::Relaxed);
        outcome
    }

    /// Reads the snapshot line, consuming the unread event.
    ///
    /// With `blocking` the caller waits (without holding the instance lock)
    /// until an event arrives, `closed` reports true, or the instance is torn
    /// down. Without it an idle instance fails with `WouldBlock` and nothing
    /// changes.
    pub fn read<F>(&self, blocking: bool, closed: F) -> DevResult<String>
    where
        F: FnMut() -> bool,
    {
        self.read_bounded(blocking, usize::MAX, closed)
    }

    /// Like [`Self::read`] but copies into `buf`.
    ///
    /// A buffer shorter than the line fails with `HandleFault` and leaves
    /// the event unread.
    pub fn read_into<F>(&self, buf: &mut [u8], blocking: bool, closed: F) -> DevResult<usize>
    where
        F: FnMut() -> bool,
    {
        let line = self.read_bounded(blocking, buf.len(), closed)?;
        buf[..line.len()].copy_from_slice(line.as_bytes());
        Ok(line.len())
    }

    fn read_bounded<F>(&self, blocking: bool, max_len: usize, mut closed: F) -> DevResult<String>
    where
        F: FnMut() -> bool,
    {
        let _access = self.lifecycle.try_access().ok_or(DevError::DeviceGone)?;
        loop {
            let seen = self.signal.epoch();
            if self.is_gone() {
                return Err(DevError::DeviceGone);
            }
            if closed() {
                return Err(DevError::Closed);
            }

            {
                let mut state = self.state.lock();
                if self.signal.peek_ready() {
                    let line = snapshot_line(self.press_count());
                    if line.len() > max_len {
                        return Err(DevError::HandleFault);
                    }
                    self.signal.consume();
                    let freed_slot = core::mem::replace(&mut state.write_pending, false);
                    drop(state);
                    if freed_slot {
                        self.signal.wake_all();
                    }
                    self.stats.reads.fetch_add(1, Ordering::Relaxed);
                    trace!("gpioevt{}: read {:?}", self.id, line.trim_end());
                    return Ok(line);
                }
            }

            if !blocking {
                return Err(DevError::WouldBlock);
            }
            self.signal
                .wait_for_change(seen, || self.is_gone() || closed());
        }
    }

    /// Handles a client write. A leading `'1'` toggles the actuator; any
    /// other payload is accepted without effect.
    ///
    /// Returns the number of bytes consumed.
    pub fn write(&self, payload: &[u8]) -> DevResult<usize> {
        let _access = self.lifecycle.try_access().ok_or(DevError::DeviceGone)?;
        if payload.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();
        if self.config.write_policy == WritePolicy::SingleSlot {
            if state.write_pending {
                return Err(DevError::WouldBlock);
            }
            state.write_pending = true;
        }
        if payload[0] == b'1' && self.actuator.is_some() {
            let on = !state.actuator_on;
            self.set_actuator(&mut state, on);
            info!(
                "gpioevt{}: actuator toggled via write: {}",
                self.id,
                on_off(on)
            );
        }
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(payload.len())
    }

    /// Non-blocking readiness query.
    pub fn poll_query(&self) -> PollEvents {
        if self.is_gone() {
            return PollEvents::HANGUP;
        }
        let state = self.state.lock();
        let mut events = PollEvents::empty();
        if self.signal.peek_ready() && state.notify_enabled {
            events |= PollEvents::READABLE;
        }
        let writable = match self.config.write_policy {
            WritePolicy::Overwrite => true,
            WritePolicy::SingleSlot => !state.write_pending,
        };
        if writable {
            events |= PollEvents::WRITABLE;
        }
        events
    }

    /// Blocks until [`Self::poll_query`] intersects `interest`, the instance
    /// goes away (`HANGUP`), or `closed` reports true.
    pub fn poll_wait<F>(&self, interest: PollEvents, mut closed: F) -> DevResult<PollEvents>
    where
        F: FnMut() -> bool,
    {
        let Some(_access) = self.lifecycle.try_access() else {
            return Ok(PollEvents::HANGUP);
        };
        loop {
            let seen = self.signal.epoch();
            let events = self.poll_query();
            if events.satisfies(interest) {
                return Ok(events);
            }
            if closed() {
                return Err(DevError::Closed);
            }
            self.signal
                .wait_for_change(seen, || self.is_gone() || closed());
        }
    }

    /// Applies a control command. `arg` is reserved and currently unused.
    pub fn control(&self, command: ControlCommand, arg: Option<u64>) -> DevResult<ControlResponse> {
        let _access = self.lifecycle.try_access().ok_or(DevError::DeviceGone)?;
        if let Some(arg) = arg {
            trace!("gpioevt{}: ignoring argument {} of {:?}", self.id, arg, command);
        }

        match command {
            ControlCommand::ResetCounter => {
                self.signal.counter().reset();
                info!("gpioevt{}: counter reset", self.id);
            }
            ControlCommand::ForceOn | ControlCommand::ForceOff => {
                let on = command == ControlCommand::ForceOn;
                if self.actuator.is_some() {
                    let mut state = self.state.lock();
                    self.set_actuator(&mut state, on);
                    info!("gpioevt{}: actuator {} via control", self.id, on_off(on));
                } else {
                    debug!("gpioevt{}: no actuator, {:?} ignored", self.id, command);
                }
            }
            ControlCommand::EnableNotify => {
                self.state.lock().notify_enabled = true;
                // Pollers parked on a hidden event must re-evaluate.
                self.signal.wake_all();
                info!("gpioevt{}: notifications enabled", self.id);
            }
            ControlCommand::DisableNotify => {
                self.state.lock().notify_enabled = false;
                info!("gpioevt{}: notifications disabled", self.id);
            }
            ControlCommand::QueryStatus => {
                return Ok(ControlResponse::with_payload(self.status().to_string()));
            }
        }
        Ok(ControlResponse::done())
    }

    /// Point-in-time status report.
    pub fn status(&self) -> InstanceStatus {
        let state = self.state.lock();
        InstanceStatus {
            id: self.id,
            label: self.config.label,
            line: self.config.line,
            polarity: self.config.polarity,
            press_count: self.press_count(),
            actuator: self.actuator.as_ref().map(|_| state.actuator_on),
            notify_enabled: state.notify_enabled,
            ready: self.signal.peek_ready(),
            accepted: self.stats.accepted.load(Ordering::Relaxed),
            ignored: self.stats.ignored.load(Ordering::Relaxed),
            overflowed: self.source.overflow_count(),
            reads: self.stats.reads.load(Ordering::Relaxed),
            writes: self.stats.writes.load(Ordering::Relaxed),
            open_handles: self.open_handles(),
            lifecycle: self.lifecycle.state(),
        }
    }

    /// Number of open client handles.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::Acquire)
    }

    pub(crate) fn handle_opened(&self) {
        self.open_handles.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn handle_closed(&self) {
        self.open_handles.fetch_sub(1, Ordering::AcqRel);
        // Wake waiters so the closing handle's blocked calls notice.
        self.signal.wake_all();
    }

    /// Teardown after the source is detached and deferred work cancelled:
    /// refuse new accesses, wake every waiter with "gone", wait for
    /// in-flight calls to leave.
    ///
    /// Returns `false` if teardown was already underway.
    pub(crate) fn shut_down(&self) -> bool {
        if !self.lifecycle.begin_teardown() {
            return false;
        }
        self.signal.close();
        self.lifecycle.wait_idle(self.relax);
        self.lifecycle.finish();
        if let Some(actuator) = &self.actuator {
            actuator.drive(false);
        }
        true
    }

    fn set_actuator(&self, state: &mut InstanceState, on: bool) {
        state.actuator_on = on;
        if let Some(actuator) = &self.actuator {
            actuator.drive(on);
        }
    }
}

impl fmt::Debug for DeviceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInstance")
            .field("id", &self.id)
            .field("label", &self.config.label)
            .field("lifecycle", &self.lifecycle)
            .field("signal", &self.signal)
            .finish()
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

/// Snapshot of an instance, rendered like a procfs info file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStatus {
    pub id: InstanceId,
    pub label: &'static str,
    pub line: u32,
    pub polarity: TriggerPolarity,
    pub press_count: u64,
    /// `None` when no actuator is attached.
    pub actuator: Option<bool>,
    pub notify_enabled: bool,
    pub ready: bool,
    pub accepted: u64,
    pub ignored: u64,
    pub overflowed: u64,
    pub reads: u64,
    pub writes: u64,
    pub open_handles: usize,
    pub lifecycle: LifecycleState,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let polarity = match self.polarity {
            TriggerPolarity::Rising => "rising",
            TriggerPolarity::Falling => "falling",
            TriggerPolarity::Both => "both",
        };
        writeln!(f, "device: {}{}", self.label, self.id)?;
        writeln!(f, "line: {}", self.line)?;
        writeln!(f, "trigger: {}", polarity)?;
        writeln!(f, "press count: {}", self.press_count)?;
        match self.actuator {
            Some(on) => writeln!(f, "actuator: {}", on_off(on))?,
            None => writeln!(f, "actuator: none")?,
        }
        writeln!(f, "notify: {}", if self.notify_enabled { "enabled" } else { "disabled" })?;
        writeln!(f, "ready: {}", self.ready)?;
        writeln!(
            f,
            "events: accepted={} ignored={} overflowed={}",
            self.accepted, self.ignored, self.overflowed
        )?;
        writeln!(f, "io: reads={} writes={}", self.reads, self.writes)?;
        writeln!(f, "handles: {}", self.open_handles)?;
        writeln!(f, "state: {:?}", self.lifecycle)
    }
}
