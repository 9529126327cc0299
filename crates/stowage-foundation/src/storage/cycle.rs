//! Cycle detection and closing.
//!
//! A move `S -> D` that finds `D` full looks for queued moves that, together
//! with it, form a closed rotation of components: somebody waiting for a slot
//! on `S` who lives on a device where somebody else is waiting, and so on,
//! until a waiter that lives on `D`. Such a rotation can never make progress
//! through the queues alone, because every participant holds the slot the next
//! one needs. Closing it assigns every participant the slot of its successor in
//! a single critical section.
//!
//! The search walks the wait-for graph depth first, starting from the mover's
//! source queue and scanning each queue from its head, so older waiters are
//! preferred when several rotations exist.

use std::collections::HashSet;

use stowage_kernel::{ComponentId, DeviceId};

use super::world::{SlotId, WaitId, World, invariant_violation};

/// One queued move taking part in a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChainLink {
    /// Device whose queue holds the entry; also where the entry is going.
    pub(crate) device: DeviceId,
    pub(crate) wait: WaitId,
}

impl World {
    /// Find queued moves that close a rotation with a move `source -> destination`.
    ///
    /// The first link waits on `source`; every following link waits on the
    /// device the previous one is leaving; the last link is leaving
    /// `destination`.
    pub(crate) fn find_cycle(
        &self,
        source: DeviceId,
        destination: DeviceId,
    ) -> Option<Vec<ChainLink>> {
        let mut visited = HashSet::from([source]);
        let mut chain = Vec::new();
        self.search(source, destination, &mut visited, &mut chain)
            .then_some(chain)
    }

    fn search(
        &self,
        device: DeviceId,
        target: DeviceId,
        visited: &mut HashSet<DeviceId>,
        chain: &mut Vec<ChainLink>,
    ) -> bool {
        let Some(state) = self.devices.get(&device) else {
            return false;
        };

        for &wait in &state.queue {
            let Some(leaving) = self.waits.get(&wait).and_then(|entry| entry.source) else {
                continue;
            };

            chain.push(ChainLink { device, wait });
            if leaving == target {
                return true;
            }
            if visited.insert(leaving) && self.search(leaving, target, visited, chain) {
                return true;
            }
            chain.pop();
        }
        false
    }

    /// Assign every link the slot of its successor and wake them all.
    ///
    /// Returns the slot the mover receives on its destination. Every slot in
    /// the rotation, including the mover's own, ends up claimed; each current
    /// owner signals its successor after its own `prepare`.
    pub(crate) fn close_cycle(&mut self, mover: ComponentId, chain: &[ChainLink]) -> SlotId {
        for link in chain {
            self.unqueue(link);
        }

        let mut vacating = self.residence_slot(mover);
        for link in chain {
            self.claim(vacating);
            let entry = self.wait_mut(link.wait);
            entry.assigned = Some(vacating);
            let component = entry.component;
            vacating = self.residence_slot(component);
        }
        self.claim(vacating);

        for link in chain {
            self.wait_mut(link.wait).signal.signal();
        }
        vacating
    }

    fn claim(&mut self, slot: SlotId) {
        let record = self.slot_mut(slot);
        record.claimed = true;
        record.releasing = false;
    }

    fn unqueue(&mut self, link: &ChainLink) {
        let threshold = self.tuning.starvation_warn_threshold;
        let state = self.device_mut(link.device);
        let Some(position) = state.queue.iter().position(|w| *w == link.wait) else {
            invariant_violation("rotation member is not queued");
        };
        state.queue.remove(position);

        if position == 0 {
            state.queue_bypasses = 0;
            return;
        }
        if state.record_bypass(threshold) {
            tracing::warn!(
                device = %link.device,
                bypasses = state.queue_bypasses,
                still_queued = state.queue.len(),
                "queued transfers repeatedly overtaken by rotations"
            );
        }
    }
}
