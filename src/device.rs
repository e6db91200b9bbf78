use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::clock::Clock;
use crate::config::{DriverConfig, InstanceConfig};
use crate::error::{DevError, DevResult};
use crate::handle::ClientHandle;
use crate::instance::{Actuator, DeviceInstance, InstanceStatus};
use crate::registry::{InstanceId, InstanceRegistry};
use crate::source::{EventSource, TriggerBinding};
use crate::work::{DeferredWorkQueue, KickFn};
use crate::MAX_DEVICES;

/// The event driver: owns every instance and the shared deferred queue.
///
/// This is what the registration layer (probe/remove) and the transport
/// layer (open) talk to.
pub struct EventDevices {
    config: DriverConfig,
    registry: InstanceRegistry,
    queue: Arc<DeferredWorkQueue>,
    clock: Arc<dyn Clock>,
    /// Trigger binding of each live slot, kept for detach on remove.
    bindings: Mutex<[Option<Arc<dyn TriggerBinding>>; MAX_DEVICES]>,
}

impl EventDevices {
    /// Creates a driver with no instances.
    pub fn new(config: DriverConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_queue(config, clock, DeferredWorkQueue::new())
    }

    /// Like [`Self::new`], calling `kick` whenever deferred work is queued.
    pub fn with_kick(config: DriverConfig, clock: Arc<dyn Clock>, kick: KickFn) -> Self {
        Self::with_queue(config, clock, DeferredWorkQueue::with_kick(kick))
    }

    fn with_queue(config: DriverConfig, clock: Arc<dyn Clock>, queue: DeferredWorkQueue) -> Self {
        Self {
            registry: InstanceRegistry::new(config.capacity),
            config,
            queue: Arc::new(queue),
            clock,
            bindings: Mutex::new(core::array::from_fn(|_| None)),
        }
    }

    /// Driver-wide configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The shared deferred work queue.
    pub fn queue(&self) -> &Arc<DeferredWorkQueue> {
        &self.queue
    }

    /// Creates an instance and attaches it to `binding`.
    ///
    /// All-or-nothing: if the binding refuses the source, the slot is
    /// released and the error is returned as [`DevError::TriggerAttach`].
    pub fn probe(
        &self,
        config: InstanceConfig,
        binding: Arc<dyn TriggerBinding>,
        actuator: Option<Arc<dyn Actuator>>,
    ) -> DevResult<InstanceId> {
        let id = self.registry.allocate().inspect_err(|_| {
            warn!("{}: no free instance slot", config.label);
        })?;

        let source = Arc::new(EventSource::new(
            id,
            config.polarity,
            Arc::clone(&self.queue),
            Arc::clone(&self.clock),
        ));
        source.set_attached(true);
        if let Err(err) = binding.attach(Arc::clone(&source)) {
            source.set_attached(false);
            self.registry.release(id);
            error!("{}{}: failed to attach trigger: {:?}", config.label, id, err);
            return Err(DevError::TriggerAttach(err));
        }

        let label = config.label;
        let line = config.line;
        let polarity = config.polarity;
        let instance = Arc::new(DeviceInstance::new(
            config,
            Arc::clone(&source),
            actuator,
            self.config.relax,
        ));
        self.bindings.lock()[id.0] = Some(binding);
        self.registry.install(id, instance);

        // Triggers that arrived before the slot went live found nothing to run.
        if source.handled_count() > 0 {
            self.queue.schedule(id);
        }
        info!(
            "{}{}: probed on line {}, trigger {:?}",
            label, id, line, polarity
        );
        Ok(id)
    }

    /// Tears down instance `id`.
    ///
    /// Detaches the trigger, cancels deferred work, wakes blocked clients
    /// with [`DevError::DeviceGone`], waits for in-flight calls and frees
    /// the slot. Returns the final press count.
    pub fn remove(&self, id: InstanceId) -> DevResult<u64> {
        let instance = self.registry.get(id).ok_or(DevError::DeviceGone)?;
        if !instance.lifecycle().is_live() {
            return Err(DevError::DeviceGone);
        }

        instance.source().set_attached(false);
        let binding = self.bindings.lock().get_mut(id.0).and_then(Option::take);
        if let Some(binding) = binding {
            binding.detach(id);
        }
        if self.queue.cancel_sync(id, self.config.relax) {
            debug!("gpioevt{}: cancelled pending deferred job", id);
        }

        if !instance.shut_down() {
            // Lost a race with another remover; it owns the release.
            return Err(DevError::DeviceGone);
        }
        let final_count = instance.press_count();
        let released = self.registry.release(id);
        drop(instance);
        drop(released);

        info!(
            "gpioevt{}: removed, final press count {}",
            id, final_count
        );
        Ok(final_count)
    }

    /// Removes every live instance, e.g. on module unload.
    pub fn remove_all(&self) {
        for id in self.registry.live_ids() {
            if let Err(err) = self.remove(id) {
                warn!("gpioevt{}: remove failed: {}", id, err);
            }
        }
    }

    /// Opens a client handle on instance `id`.
    pub fn open(&self, id: InstanceId) -> DevResult<ClientHandle> {
        let instance = self.registry.get(id).ok_or(DevError::DeviceGone)?;
        if instance.is_gone() {
            return Err(DevError::DeviceGone);
        }
        trace!("gpioevt{}: handle opened", id);
        Ok(ClientHandle::new(&instance))
    }

    /// Schedulable-context entry point: runs one pass of pending deferred
    /// jobs and returns how many ran.
    pub fn run_deferred(&self) -> usize {
        let mut ran = 0;
        for _ in 0..self.registry.capacity() {
            let Some(id) = self.queue.claim_next() else {
                break;
            };
            match self.registry.get(id) {
                Some(instance) => {
                    let outcome = instance.process_deferred();
                    trace!(
                        "gpioevt{}: deferred job done, accepted={} ignored={}",
                        id, outcome.accepted, outcome.ignored
                    );
                }
                None => warn!("gpioevt{}: deferred job for empty slot dropped", id),
            }
            self.queue.complete(id);
            ran += 1;
        }
        ran
    }

    /// Status report of instance `id`.
    pub fn status(&self, id: InstanceId) -> DevResult<InstanceStatus> {
        self.registry
            .get(id)
            .map(|instance| instance.status())
            .ok_or(DevError::DeviceGone)
    }

    /// Ids of all live instances, ascending.
    pub fn live_ids(&self) -> Vec<InstanceId> {
        self.registry.live_ids()
    }

    /// The live instance in slot `id`.
    pub fn instance(&self, id: InstanceId) -> Option<Arc<DeviceInstance>> {
        self.registry.get(id)
    }
}

impl core::fmt::Debug for EventDevices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventDevices")
            .field("registry", &self.registry)
            .field("queue", &self.queue)
            .finish()
    }
}
