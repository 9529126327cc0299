//! Transfer descriptor contract.
//!
//! A [`ComponentTransfer`] is produced by the caller and handed to the engine's
//! `execute`. The engine reads its identifiers once, validates them, and later
//! invokes [`prepare`](ComponentTransfer::prepare) and then
//! [`perform`](ComponentTransfer::perform) exactly once each, on the calling
//! thread.
//!
//! # Callback rules
//!
//! - `prepare` runs only after validation succeeded and while the caller holds
//!   exclusive logical ownership of the slot transition.
//! - `perform` runs only after `prepare` returned and once the destination
//!   slot (if any) has been fully handed over.
//! - Neither callback may call back into the same engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ComponentId, DeviceId};

/// Caller-supplied description of a single transfer.
pub trait ComponentTransfer: Send + Sync {
    /// The component being transferred.
    fn component_id(&self) -> ComponentId;

    /// Device the component currently occupies, `None` for an add.
    fn source_device_id(&self) -> Option<DeviceId>;

    /// Device the component should end up on, `None` for a removal.
    fn destination_device_id(&self) -> Option<DeviceId>;

    /// First phase: runs once the source slot (if any) is being released.
    fn prepare(&self);

    /// Second phase: runs once the destination slot (if any) is owned.
    fn perform(&self);
}

/// Shape of a transfer, derived from which devices are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    /// Place a new component on a device.
    Add,
    /// Take a component off its device.
    Remove,
    /// Relocate a component from one device to another.
    Move,
    /// Neither device given.
    Malformed,
}

impl TransferKind {
    pub fn of(source: Option<DeviceId>, destination: Option<DeviceId>) -> Self {
        match (source, destination) {
            (None, Some(_)) => Self::Add,
            (Some(_), None) => Self::Remove,
            (Some(_), Some(_)) => Self::Move,
            (None, None) => Self::Malformed,
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
            Self::Move => write!(f, "move"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

/// Identifier triple read from a [`ComponentTransfer`] at admission.
///
/// The descriptor's accessors are read exactly once so the engine works on a
/// stable copy even if the caller's implementation is not pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferRequest {
    pub component: ComponentId,
    pub source: Option<DeviceId>,
    pub destination: Option<DeviceId>,
}

impl TransferRequest {
    pub fn new(
        component: ComponentId,
        source: Option<DeviceId>,
        destination: Option<DeviceId>,
    ) -> Self {
        Self {
            component,
            source,
            destination,
        }
    }

    /// Capture the identifiers of a transfer descriptor.
    pub fn of(transfer: &(impl ComponentTransfer + ?Sized)) -> Self {
        Self::new(
            transfer.component_id(),
            transfer.source_device_id(),
            transfer.destination_device_id(),
        )
    }

    pub fn kind(&self) -> TransferKind {
        TransferKind::of(self.source, self.destination)
    }
}
