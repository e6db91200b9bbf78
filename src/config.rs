use core::time::Duration;

use crate::MAX_DEVICES;

/// Default debounce window between two accepted events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Hook invoked while a caller waits for a condition without holding locks.
///
/// Hosts with a scheduler pass their yield primitive here.
pub type RelaxFn = fn();

/// Driver-wide configuration.
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Number of instance slots, at most [`MAX_DEVICES`].
    pub capacity: usize,
    /// Called on every spin of a blocking wait.
    pub relax: RelaxFn,
}

impl DriverConfig {
    /// Full capacity, relaxing with `spin_loop`.
    pub fn new() -> Self {
        Self {
            capacity: MAX_DEVICES,
            relax: core::hint::spin_loop,
        }
    }

    /// Sets the slot count (clamped to [`MAX_DEVICES`]).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.min(MAX_DEVICES);
        self
    }

    /// Sets the relax hook.
    pub fn with_relax(mut self, relax: RelaxFn) -> Self {
        self.relax = relax;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Which edges of the trigger line count as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPolarity {
    /// Low-to-high transitions only.
    Rising,
    /// High-to-low transitions only (button press on a pulled-up line).
    Falling,
    /// Both transitions.
    Both,
}

/// What an accepted event does to the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorPolicy {
    /// Leave the actuator alone.
    Ignore,
    /// Flip the actuator on every accepted event.
    Toggle,
    /// Switch the actuator on.
    SetOn,
}

/// How writes interact with readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Every write is accepted; the device is always writable.
    Overwrite,
    /// A write occupies a single pending slot until a read consumes it.
    SingleSlot,
}

/// Per-instance configuration handed over by the registration layer.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Human readable name used in logs and status reports.
    pub label: &'static str,
    /// Trigger line number.
    pub line: u32,
    /// Edge filter.
    pub polarity: TriggerPolarity,
    /// Minimum spacing between accepted events.
    pub debounce: Duration,
    /// Actuator effect of an accepted event.
    pub actuator_policy: ActuatorPolicy,
    /// Initial value of the notify gate.
    pub notify_enabled: bool,
    /// Write discipline.
    pub write_policy: WritePolicy,
}

impl InstanceConfig {
    /// Falling-edge button on `line` with the default debounce window.
    pub fn new(line: u32) -> Self {
        Self {
            label: "gpioevt",
            line,
            polarity: TriggerPolarity::Falling,
            debounce: DEFAULT_DEBOUNCE,
            actuator_policy: ActuatorPolicy::Toggle,
            notify_enabled: true,
            write_policy: WritePolicy::Overwrite,
        }
    }

    /// Sets the name used in logs and status reports.
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Sets which edges count as events.
    pub fn with_polarity(mut self, polarity: TriggerPolarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Sets the minimum spacing between accepted events.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets what an accepted event does to the actuator.
    pub fn with_actuator_policy(mut self, policy: ActuatorPolicy) -> Self {
        self.actuator_policy = policy;
        self
    }

    /// Sets the initial notify gate.
    pub fn with_notify(mut self, enabled: bool) -> Self {
        self.notify_enabled = enabled;
        self
    }

    /// Sets the write discipline.
    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self::new(0)
    }
}
