//! Per-open client handle.

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::control::{ControlRequest, ControlResponse};
use crate::error::{DevError, DevResult};
use crate::instance::DeviceInstance;
use crate::notify::PollEvents;
use crate::registry::InstanceId;

/// A client's open session on one device instance.
///
/// The handle only holds a weak reference: once the instance is removed
/// every call fails with [`DevError::DeviceGone`] (or reports `HANGUP` for
/// polls) instead of touching freed state.
pub struct ClientHandle {
    id: InstanceId,
    instance: Weak<DeviceInstance>,
    closing: AtomicBool,
}

impl ClientHandle {
    pub(crate) fn new(instance: &Arc<DeviceInstance>) -> Self {
        instance.handle_opened();
        Self {
            id: instance.id(),
            instance: Arc::downgrade(instance),
            closing: AtomicBool::new(false),
        }
    }

    /// Instance this handle was opened on.
    #[inline]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Whether [`Self::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Reads `"Press Count: <n>\n"`, see [`DeviceInstance::read`].
    pub fn read(&self, blocking: bool) -> DevResult<String> {
        let instance = self.instance()?;
        instance.read(blocking, || self.is_closed())
    }

    /// Reads into a caller buffer, see [`DeviceInstance::read_into`].
    pub fn read_into(&self, buf: &mut [u8], blocking: bool) -> DevResult<usize> {
        let instance = self.instance()?;
        instance.read_into(buf, blocking, || self.is_closed())
    }

    /// Writes a payload, see [`DeviceInstance::write`].
    pub fn write(&self, payload: &[u8]) -> DevResult<usize> {
        self.instance()?.write(payload)
    }

    /// Current readiness without blocking.
    pub fn poll(&self) -> PollEvents {
        match self.instance.upgrade() {
            Some(instance) => instance.poll_query(),
            None => PollEvents::HANGUP,
        }
    }

    /// Waits until any of `interest` (or `HANGUP`) is reported.
    pub fn poll_wait(&self, interest: PollEvents) -> DevResult<PollEvents> {
        if self.is_closed() {
            return Err(DevError::Closed);
        }
        match self.instance.upgrade() {
            Some(instance) => instance.poll_wait(interest, || self.is_closed()),
            None => Ok(PollEvents::HANGUP),
        }
    }

    /// Decodes and applies a control request.
    pub fn control(&self, request: ControlRequest) -> DevResult<ControlResponse> {
        let command = request.command()?;
        self.instance()?.control(command, request.arg)
    }

    /// Closes the handle. Blocked calls on it return [`DevError::Closed`].
    ///
    /// Idempotent; dropping the handle closes it too.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(instance) = self.instance.upgrade() {
            instance.handle_closed();
            trace!("gpioevt{}: handle closed", self.id);
        }
    }

    fn instance(&self) -> DevResult<Arc<DeviceInstance>> {
        if self.is_closed() {
            return Err(DevError::Closed);
        }
        self.instance.upgrade().ok_or(DevError::DeviceGone)
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl core::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::InstanceConfig;
    use crate::control::ControlCommand;
    use crate::source::EventSource;
    use crate::work::DeferredWorkQueue;

    fn instance() -> Arc<DeviceInstance> {
        let config = InstanceConfig::new(0);
        let source = Arc::new(EventSource::new(
            InstanceId(2),
            config.polarity,
            Arc::new(DeferredWorkQueue::new()),
            Arc::new(ManualClock::new()),
        ));
        Arc::new(DeviceInstance::new(config, source, None, core::hint::spin_loop))
    }

    #[test]
    fn test_open_close_counts() {
        let dev = instance();
        let a = ClientHandle::new(&dev);
        let b = ClientHandle::new(&dev);
        assert_eq!(a.id(), InstanceId(2));
        assert_eq!(dev.open_handles(), 2);

        a.close();
        a.close();
        assert_eq!(dev.open_handles(), 1);
        assert_eq!(a.read(false), Err(DevError::Closed));
        assert_eq!(a.poll_wait(PollEvents::READABLE), Err(DevError::Closed));

        drop(b);
        assert_eq!(dev.open_handles(), 0);
    }

    #[test]
    fn test_unknown_opcode() {
        let dev = instance();
        let handle = ClientHandle::new(&dev);
        assert_eq!(
            handle.control(ControlRequest::new(99)),
            Err(DevError::InvalidCommand)
        );
        assert!(handle.control(ControlCommand::ResetCounter.into()).is_ok());
    }

    #[test]
    fn test_dropped_instance_is_gone() {
        let dev = instance();
        let handle = ClientHandle::new(&dev);
        drop(dev);
        assert_eq!(handle.read(false), Err(DevError::DeviceGone));
        assert_eq!(handle.write(b"1"), Err(DevError::DeviceGone));
        assert_eq!(handle.poll(), PollEvents::HANGUP);
        assert_eq!(handle.poll_wait(PollEvents::READABLE), Ok(PollEvents::HANGUP));
    }
}
