//! Transfer orchestrator.
//!
//! [`StorageSystem::execute`] drives one request through admission, slot
//! acquisition (fast path, cycle closing or queueing) and the two-phase
//! hand-off. The coordination lock is never held while a callback runs or
//! while a thread blocks on a hand-off signal.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use stowage_kernel::{
    ComponentId, ComponentTransfer, ConfigResult, DeviceId, StorageConfig, TransferError,
    TransferRequest,
};

use super::handoff::Handoff;
use super::metrics::StorageMetrics;
use super::snapshot::StorageSnapshot;
use super::world::{Grant, SlotId, VacateOutcome, World};

/// Destination slot obtained for a request.
enum Claim {
    /// Removal; no destination.
    None,
    /// Fresh slot from unused capacity, usable right away.
    Ready(SlotId),
    /// Slot still owned by someone who signals once they are done preparing.
    Promised { slot: SlotId, signal: Arc<Handoff> },
}

/// Concurrent component placement engine over a fixed set of devices.
///
/// `execute` may be called from any number of threads at once. Every call
/// blocks until its transfer is fully committed or rejected.
#[derive(Debug)]
pub struct StorageSystem {
    world: Mutex<World>,
    metrics: StorageMetrics,
}

impl StorageSystem {
    /// Build an engine from device capacities and the initial placement.
    pub fn new(
        capacities: HashMap<DeviceId, usize>,
        placement: HashMap<ComponentId, DeviceId>,
    ) -> ConfigResult<Self> {
        Self::from_config(&StorageConfig::from_maps(&capacities, &placement))
    }

    /// Build an engine from a validated [`StorageConfig`].
    pub fn from_config(config: &StorageConfig) -> ConfigResult<Self> {
        let (capacities, placement) = config.validate()?;
        tracing::info!(
            devices = capacities.len(),
            components = placement.len(),
            starvation_warn_threshold = config.tuning.starvation_warn_threshold,
            "storage system initialized"
        );

        Ok(Self {
            world: Mutex::new(World::new(capacities, placement, config.tuning)),
            metrics: StorageMetrics::new(),
        })
    }

    /// Run one transfer to completion.
    ///
    /// Invokes `prepare` and then `perform` on the calling thread exactly once
    /// each, unless the request is rejected, in which case neither runs and
    /// the engine state is unchanged.
    pub fn execute<T>(&self, transfer: &T) -> Result<(), TransferError>
    where
        T: ComponentTransfer + ?Sized,
    {
        let request = TransferRequest::of(transfer);
        let span = tracing::debug_span!(
            "transfer",
            component = %request.component,
            kind = %request.kind(),
            source = ?request.source,
            destination = ?request.destination,
        );
        let _entered = span.enter();

        let mut world = self.world.lock();
        if let Err(err) = world.admit(&request) {
            MutexGuard::unlock_fair(world);
            self.metrics.record_rejected();
            tracing::debug!(error = %err, "transfer rejected");
            return Err(err);
        }
        self.metrics.record_admitted();

        let (world, claim) = self.acquire(world, &request);
        self.hand_off(world, transfer, &request, claim);
        Ok(())
    }

    /// Consistent view of every device, taken under the coordination lock.
    pub fn snapshot(&self) -> StorageSnapshot {
        let world = self.world.lock();
        let snapshot = world.snapshot();
        MutexGuard::unlock_fair(world);
        snapshot
    }

    pub fn metrics(&self) -> &StorageMetrics {
        &self.metrics
    }

    fn acquire<'a>(
        &'a self,
        mut world: MutexGuard<'a, World>,
        request: &TransferRequest,
    ) -> (MutexGuard<'a, World>, Claim) {
        let Some(destination) = request.destination else {
            return (world, Claim::None);
        };

        match world.grant_slot(request.component, destination) {
            Some(Grant::Free(slot)) => {
                self.metrics.record_free_grant();
                tracing::debug!("free slot granted");
                return (world, Claim::Ready(slot));
            }
            Some(Grant::Releasing(slot)) => {
                self.metrics.record_releasing_claim();
                tracing::debug!("claimed a releasing slot");
                let signal = world.slot_signal(slot);
                return (world, Claim::Promised { slot, signal });
            }
            None => {}
        }

        if let Some(source) = request.source {
            if let Some(chain) = world.find_cycle(source, destination) {
                let slot = world.close_cycle(request.component, &chain);
                self.metrics.record_cycle(chain.len());
                tracing::debug!(chain_len = chain.len(), "closed a rotation of queued moves");
                let signal = world.slot_signal(slot);
                return (world, Claim::Promised { slot, signal });
            }
        }

        let (wait, wake) = world.enqueue(destination, request.source, request.component);
        self.metrics.record_queued_wait();
        tracing::debug!(device = %destination, "destination full, queued");
        MutexGuard::unlock_fair(world);

        wake.wait();

        // Whoever woke us already assigned a slot; anything else that changed
        // meanwhile cannot touch a claimed slot or this component.
        let mut world = self.world.lock();
        let slot = world.take_assignment(wait);
        let signal = world.slot_signal(slot);
        tracing::debug!("woken with an assigned slot");
        (world, Claim::Promised { slot, signal })
    }

    fn hand_off<T>(
        &self,
        mut world: MutexGuard<'_, World>,
        transfer: &T,
        request: &TransferRequest,
        claim: Claim,
    ) where
        T: ComponentTransfer + ?Sized,
    {
        let vacated = request.source.map(|source| {
            let (slot, outcome) = world.vacate(request.component, source);
            if let VacateOutcome::HandedOff(successor) = outcome {
                self.metrics.record_vacate_handoff();
                tracing::debug!(%successor, "source slot handed to queued transfer");
            }
            slot
        });
        MutexGuard::unlock_fair(world);

        transfer.prepare();

        if let Some(slot) = vacated {
            let mut world = self.world.lock();
            world.finish_vacate(slot);
            MutexGuard::unlock_fair(world);
        }

        let slot = match claim {
            Claim::None => None,
            Claim::Ready(slot) => Some(slot),
            Claim::Promised { slot, signal } => {
                signal.wait();
                Some(slot)
            }
        };

        if let (Some(slot), Some(destination)) = (slot, request.destination) {
            let mut world = self.world.lock();
            world.bind(slot, request.component, destination);
            MutexGuard::unlock_fair(world);
        }

        transfer.perform();

        let mut world = self.world.lock();
        world.commit(request, slot);
        MutexGuard::unlock_fair(world);

        self.metrics.record_completed();
        tracing::debug!("transfer committed");
    }
}
