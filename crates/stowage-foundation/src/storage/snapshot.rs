//! Point-in-time view of the engine, taken under the coordination lock.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use stowage_kernel::{ComponentId, DeviceId};

/// Occupancy of a single device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub capacity: usize,
    /// Slots in use, including releasing and claimed ones.
    pub occupied: usize,
    pub releasing: usize,
    pub claimed: usize,
    /// Transfers blocked waiting for a slot on this device.
    pub queued: usize,
    /// Waiters served out of arrival order since the last FIFO hand-off.
    pub queue_bypasses: u32,
}

impl DeviceSnapshot {
    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.occupied)
    }
}

/// Consistent view of every device, the placement index and in-flight set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    /// Ordered by device id.
    pub devices: Vec<DeviceSnapshot>,
    pub placement: BTreeMap<ComponentId, DeviceId>,
    /// Sorted.
    pub in_flight: Vec<ComponentId>,
}

impl StorageSnapshot {
    pub fn device(&self, id: DeviceId) -> Option<&DeviceSnapshot> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Device a component is committed to, if any.
    pub fn location(&self, component: ComponentId) -> Option<DeviceId> {
        self.placement.get(&component).copied()
    }

    /// Components committed to `device`, in id order.
    pub fn residents(&self, device: DeviceId) -> Vec<ComponentId> {
        self.placement
            .iter()
            .filter(|(_, d)| **d == device)
            .map(|(c, _)| *c)
            .collect()
    }

    /// True when no transfer is in progress and nobody is queued.
    pub fn is_quiescent(&self) -> bool {
        self.in_flight.is_empty()
            && self
                .devices
                .iter()
                .all(|d| d.queued == 0 && d.releasing == 0 && d.claimed == 0)
    }
}
