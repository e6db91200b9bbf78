//! Fixed-capacity instance registry.
//!
//! An arena of slots indexed by [`InstanceId`]. The registry lock is only
//! held for the O(capacity) scan in [`InstanceRegistry::allocate`] and for
//! O(1) slot updates, never across a blocking call.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use arrayvec::ArrayVec;
use spin::Mutex;

use crate::error::{DevError, DevResult};
use crate::instance::DeviceInstance;
use crate::MAX_DEVICES;

/// Small integer naming a live instance; equal to its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub usize);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

enum Slot {
    Free,
    /// Allocated, instance still under construction.
    Reserved,
    Live(Arc<DeviceInstance>),
}

/// Owner of every live [`DeviceInstance`].
pub struct InstanceRegistry {
    slots: Mutex<ArrayVec<Slot, MAX_DEVICES>>,
}

impl InstanceRegistry {
    /// Creates a registry with `capacity` slots (at most [`MAX_DEVICES`]).
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.min(MAX_DEVICES)).map(|_| Slot::Free).collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Reserves the lowest free slot.
    pub fn allocate(&self) -> DevResult<InstanceId> {
        let mut slots = self.slots.lock();
        let index = slots
            .iter()
            .position(|slot| matches!(slot, Slot::Free))
            .ok_or(DevError::Exhausted)?;
        slots[index] = Slot::Reserved;
        debug!("registry: allocated slot {}", index);
        Ok(InstanceId(index))
    }

    /// Publishes a constructed instance into its reserved slot.
    ///
    /// # Panics
    ///
    /// If `id` was not reserved by [`Self::allocate`].
    pub fn install(&self, id: InstanceId, instance: Arc<DeviceInstance>) {
        let mut slots = self.slots.lock();
        match slots.get_mut(id.0) {
            Some(slot) if matches!(slot, Slot::Reserved) => *slot = Slot::Live(instance),
            _ => panic!("registry: install into slot {} that is not reserved", id),
        }
    }

    /// The live instance in slot `id`, if any.
    pub fn get(&self, id: InstanceId) -> Option<Arc<DeviceInstance>> {
        match self.slots.lock().get(id.0) {
            Some(Slot::Live(instance)) => Some(Arc::clone(instance)),
            _ => None,
        }
    }

    /// Frees slot `id` and hands back its instance so the caller drops it
    /// outside the registry lock.
    ///
    /// The caller guarantees that no deferred work or blocked waiter still
    /// refers to `id`.
    ///
    /// # Panics
    ///
    /// On double release or release of an id that was never allocated.
    pub fn release(&self, id: InstanceId) -> Option<Arc<DeviceInstance>> {
        let mut slots = self.slots.lock();
        let slot = match slots.get_mut(id.0) {
            Some(slot) => slot,
            None => panic!("registry: release of out-of-range slot {}", id),
        };
        match core::mem::replace(slot, Slot::Free) {
            Slot::Free => panic!("registry: release of unallocated slot {}", id),
            Slot::Reserved => {
                debug!("registry: released reserved slot {}", id);
                None
            }
            Slot::Live(instance) => {
                debug!("registry: released slot {}", id);
                Some(instance)
            }
        }
    }

    /// Ids of all live instances, ascending.
    pub fn live_ids(&self) -> Vec<InstanceId> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
            .map(|(index, _)| InstanceId(index))
            .collect()
    }

    /// Number of slots that are not free.
    pub fn used(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| !matches!(slot, Slot::Free))
            .count()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new(MAX_DEVICES)
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .finish()
    }
}
