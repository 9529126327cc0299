//! Protected world state.
//!
//! Everything in [`World`] is touched only while holding the coordination lock.
//! Slot records and wait entries live in arenas keyed by stable handles
//! ([`SlotId`], [`WaitId`]); devices and the placement index refer to them by
//! handle so a slot can change owner without being moved or re-keyed.
//!
//! Per-slot state machine:
//!
//! ```text
//! free -> occupied -> releasing -> claimed -> occupied (new owner)
//!                 \_________________^
//!                  (queued successor)
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use stowage_kernel::{ComponentId, DeviceId, EngineTuning, TransferError, TransferRequest};

use super::handoff::Handoff;
use super::snapshot::{DeviceSnapshot, StorageSnapshot};

/// Handle of a slot record in the slot arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SlotId(u64);

/// Handle of a wait entry in the wait arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct WaitId(u64);

/// One occupied unit of device capacity.
#[derive(Debug)]
pub(crate) struct SlotRecord {
    pub(crate) device: DeviceId,
    pub(crate) owner: ComponentId,
    /// Owner relinquished the slot and nobody has claimed it yet.
    pub(crate) releasing: bool,
    /// A specific successor has been promised this slot.
    pub(crate) claimed: bool,
    /// Wakes the promised successor once the owner finished preparing.
    pub(crate) signal: Arc<Handoff>,
}

impl SlotRecord {
    fn new(device: DeviceId, owner: ComponentId) -> Self {
        Self {
            device,
            owner,
            releasing: false,
            claimed: false,
            signal: Arc::new(Handoff::new()),
        }
    }
}

/// A transfer blocked on a destination device's capacity.
#[derive(Debug)]
pub(crate) struct WaitEntry {
    pub(crate) source: Option<DeviceId>,
    pub(crate) component: ComponentId,
    pub(crate) signal: Arc<Handoff>,
    /// Filled in by whoever wakes the waiter.
    pub(crate) assigned: Option<SlotId>,
}

#[derive(Debug)]
pub(crate) struct DeviceState {
    pub(crate) capacity: usize,
    pub(crate) slots: BTreeSet<SlotId>,
    pub(crate) queue: VecDeque<WaitId>,
    /// Waiters consumed out of arrival order since the last FIFO hand-off.
    pub(crate) queue_bypasses: u32,
}

impl DeviceState {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: BTreeSet::new(),
            queue: VecDeque::new(),
            queue_bypasses: 0,
        }
    }

    /// Count a waiter taken out of arrival order. True once past `threshold`.
    pub(crate) fn record_bypass(&mut self, threshold: u32) -> bool {
        self.queue_bypasses += 1;
        self.queue_bypasses > threshold
    }
}

/// Where a resident component lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Residence {
    pub(crate) device: DeviceId,
    pub(crate) slot: SlotId,
}

/// Slot obtained without queueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant {
    /// Unused capacity; the slot is owned immediately.
    Free(SlotId),
    /// A releasing slot; usable once its owner signals.
    Releasing(SlotId),
}

/// What happened to the source slot during the vacate phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VacateOutcome {
    /// The head waiter of the source queue was promised the slot.
    HandedOff(ComponentId),
    /// Nobody is waiting; the slot is up for grabs.
    Releasing,
    /// A successor was already chosen (releasing claim or cycle).
    AlreadyClaimed,
}

#[cold]
#[track_caller]
pub(crate) fn invariant_violation(what: &str) -> ! {
    tracing::error!(what, "storage invariant violated");
    panic!("storage invariant violated: {what}");
}

#[derive(Debug)]
pub(crate) struct World {
    pub(crate) devices: BTreeMap<DeviceId, DeviceState>,
    pub(crate) slots: HashMap<SlotId, SlotRecord>,
    pub(crate) waits: HashMap<WaitId, WaitEntry>,
    pub(crate) placement: HashMap<ComponentId, Residence>,
    pub(crate) in_flight: HashSet<ComponentId>,
    pub(crate) tuning: EngineTuning,
    next_slot: u64,
    next_wait: u64,
}

impl World {
    /// Build the world from already validated construction maps.
    pub(crate) fn new(
        capacities: BTreeMap<DeviceId, usize>,
        placement: BTreeMap<ComponentId, DeviceId>,
        tuning: EngineTuning,
    ) -> Self {
        let mut world = Self {
            devices: capacities
                .into_iter()
                .map(|(id, capacity)| (id, DeviceState::new(capacity)))
                .collect(),
            slots: HashMap::new(),
            waits: HashMap::new(),
            placement: HashMap::new(),
            in_flight: HashSet::new(),
            tuning,
            next_slot: 0,
            next_wait: 0,
        };

        for (component, device) in placement {
            let slot = world.new_slot(device, component);
            world.placement.insert(component, Residence { device, slot });
        }
        world
    }

    fn new_slot(&mut self, device: DeviceId, owner: ComponentId) -> SlotId {
        let slot = SlotId(self.next_slot);
        self.next_slot += 1;
        self.slots.insert(slot, SlotRecord::new(device, owner));
        self.device_mut(device).slots.insert(slot);
        slot
    }

    pub(crate) fn device_mut(&mut self, device: DeviceId) -> &mut DeviceState {
        self.devices
            .get_mut(&device)
            .unwrap_or_else(|| invariant_violation(&format!("unknown device {device}")))
    }

    pub(crate) fn slot(&self, slot: SlotId) -> &SlotRecord {
        self.slots
            .get(&slot)
            .unwrap_or_else(|| invariant_violation(&format!("dangling {slot:?}")))
    }

    pub(crate) fn slot_mut(&mut self, slot: SlotId) -> &mut SlotRecord {
        self.slots
            .get_mut(&slot)
            .unwrap_or_else(|| invariant_violation(&format!("dangling {slot:?}")))
    }

    pub(crate) fn wait_mut(&mut self, wait: WaitId) -> &mut WaitEntry {
        self.waits
            .get_mut(&wait)
            .unwrap_or_else(|| invariant_violation(&format!("dangling {wait:?}")))
    }

    /// Slot currently held by a resident component.
    pub(crate) fn residence_slot(&self, component: ComponentId) -> SlotId {
        self.placement
            .get(&component)
            .map(|r| r.slot)
            .unwrap_or_else(|| invariant_violation(&format!("{component} has no residence")))
    }

    pub(crate) fn slot_signal(&self, slot: SlotId) -> Arc<Handoff> {
        Arc::clone(&self.slot(slot).signal)
    }

    /// Validate a request and mark its component in flight.
    ///
    /// Nothing is mutated unless every check passes.
    pub(crate) fn admit(&mut self, request: &TransferRequest) -> Result<(), TransferError> {
        let component = request.component;
        let current = self.placement.get(&component).map(|r| r.device);

        if request.source.is_none() && request.destination.is_none() {
            return Err(TransferError::MalformedTransfer(component));
        }

        match request.source {
            Some(source) => {
                if !self.devices.contains_key(&source) {
                    return Err(TransferError::UnknownDevice(source));
                }
                if current != Some(source) {
                    return Err(TransferError::ComponentNotResident {
                        component,
                        device: source,
                    });
                }
            }
            None => {
                if let Some(device) = current {
                    return Err(TransferError::ComponentAlreadyPlaced { component, device });
                }
            }
        }

        if let Some(destination) = request.destination {
            if !self.devices.contains_key(&destination) {
                return Err(TransferError::UnknownDevice(destination));
            }
            if current == Some(destination) {
                return Err(TransferError::ComponentDoesNotNeedTransfer {
                    component,
                    device: destination,
                });
            }
        }

        if !self.in_flight.insert(component) {
            return Err(TransferError::ComponentBeingOperatedOn(component));
        }
        Ok(())
    }

    /// Fast path: unused capacity first, then a slot whose owner is leaving.
    pub(crate) fn grant_slot(
        &mut self,
        component: ComponentId,
        destination: DeviceId,
    ) -> Option<Grant> {
        let device = self.device_mut(destination);
        if device.slots.len() < device.capacity {
            return Some(Grant::Free(self.new_slot(destination, component)));
        }

        let device = &self.devices[&destination];
        let slot = device
            .slots
            .iter()
            .copied()
            .find(|id| self.slots.get(id).is_some_and(|record| record.releasing))?;

        let record = self.slot_mut(slot);
        record.releasing = false;
        record.claimed = true;
        Some(Grant::Releasing(slot))
    }

    /// Queue a request on its destination device.
    pub(crate) fn enqueue(
        &mut self,
        destination: DeviceId,
        source: Option<DeviceId>,
        component: ComponentId,
    ) -> (WaitId, Arc<Handoff>) {
        let wait = WaitId(self.next_wait);
        self.next_wait += 1;

        let signal = Arc::new(Handoff::new());
        self.waits.insert(
            wait,
            WaitEntry {
                source,
                component,
                signal: Arc::clone(&signal),
                assigned: None,
            },
        );
        self.device_mut(destination).queue.push_back(wait);
        (wait, signal)
    }

    /// Retire a woken wait entry and return the slot it was given.
    pub(crate) fn take_assignment(&mut self, wait: WaitId) -> SlotId {
        let entry = self
            .waits
            .remove(&wait)
            .unwrap_or_else(|| invariant_violation(&format!("woken {wait:?} is gone")));
        entry.assigned.unwrap_or_else(|| {
            invariant_violation(&format!("{wait:?} of {} woke without a slot", entry.component))
        })
    }

    /// Vacate phase: pick a successor for the source slot if one is waiting.
    pub(crate) fn vacate(
        &mut self,
        component: ComponentId,
        source: DeviceId,
    ) -> (SlotId, VacateOutcome) {
        let slot = self.residence_slot(component);
        if self.slot(slot).claimed {
            return (slot, VacateOutcome::AlreadyClaimed);
        }

        let device = self.device_mut(source);
        match device.queue.pop_front() {
            Some(wait) => {
                device.queue_bypasses = 0;
                self.slot_mut(slot).claimed = true;
                let entry = self.wait_mut(wait);
                entry.assigned = Some(slot);
                entry.signal.signal();
                (slot, VacateOutcome::HandedOff(entry.component))
            }
            None => {
                self.slot_mut(slot).releasing = true;
                (slot, VacateOutcome::Releasing)
            }
        }
    }

    /// After `prepare`: wake the promised successor or drop the slot.
    ///
    /// Returns `true` when a successor was signalled.
    pub(crate) fn finish_vacate(&mut self, slot: SlotId) -> bool {
        let record = self.slot(slot);
        if record.claimed {
            record.signal.signal();
            return true;
        }

        let device = record.device;
        tracing::trace!(owner = %record.owner, %device, "slot freed");
        self.slots.remove(&slot);
        self.device_mut(device).slots.remove(&slot);
        false
    }

    /// Claim phase: rebind a slot to its new owner on `device`.
    pub(crate) fn bind(&mut self, slot: SlotId, component: ComponentId, device: DeviceId) {
        let record = self.slot_mut(slot);
        record.owner = component;
        record.device = device;
        record.claimed = false;
        record.releasing = false;
        self.device_mut(device).slots.insert(slot);
    }

    /// Final bookkeeping after `perform`.
    pub(crate) fn commit(&mut self, request: &TransferRequest, slot: Option<SlotId>) {
        match (request.destination, slot) {
            (Some(device), Some(slot)) => {
                self.placement
                    .insert(request.component, Residence { device, slot });
            }
            _ => {
                self.placement.remove(&request.component);
            }
        }
        self.in_flight.remove(&request.component);
    }

    pub(crate) fn snapshot(&self) -> StorageSnapshot {
        let devices = self
            .devices
            .iter()
            .map(|(&id, device)| {
                let records = device.slots.iter().filter_map(|slot| self.slots.get(slot));
                let (releasing, claimed) =
                    records.fold((0, 0), |(releasing, claimed), record| {
                        (
                            releasing + usize::from(record.releasing),
                            claimed + usize::from(record.claimed),
                        )
                    });
                DeviceSnapshot {
                    id,
                    capacity: device.capacity,
                    occupied: device.slots.len(),
                    releasing,
                    claimed,
                    queued: device.queue.len(),
                    queue_bypasses: device.queue_bypasses,
                }
            })
            .collect();

        let mut in_flight: Vec<ComponentId> = self.in_flight.iter().copied().collect();
        in_flight.sort();

        StorageSnapshot {
            devices,
            placement: self
                .placement
                .iter()
                .map(|(&component, residence)| (component, residence.device))
                .collect(),
            in_flight,
        }
    }
}
