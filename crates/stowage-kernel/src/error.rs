//! Error types for `stowage-kernel`.
//!
//! Two classes exist:
//!
//! - [`TransferError`]: one per rejected `execute` call. Recoverable at the call
//!   site; a rejected request leaves the engine untouched.
//! - [`ConfigError`](crate::config::ConfigError): raised while building an
//!   engine. The engine is unusable if construction fails.

use thiserror::Error;

use crate::ids::{ComponentId, DeviceId};

/// Rejection of a single transfer request.
///
/// All checks happen under the coordination lock before any mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransferError {
    /// Neither a source nor a destination device was given.
    #[error("Transfer of {0} names neither a source nor a destination device")]
    MalformedTransfer(ComponentId),

    /// The named device is not part of the system.
    #[error("Device does not exist: {0}")]
    UnknownDevice(DeviceId),

    /// The component is not placed on the stated source device.
    #[error("Component {component} is not present on {device}")]
    ComponentNotResident {
        component: ComponentId,
        device: DeviceId,
    },

    /// An add was requested for a component that is already placed.
    #[error("Component {component} already exists on {device}")]
    ComponentAlreadyPlaced {
        component: ComponentId,
        device: DeviceId,
    },

    /// The component already resides on the requested destination.
    #[error("Component {component} is already on {device}, no transfer needed")]
    ComponentDoesNotNeedTransfer {
        component: ComponentId,
        device: DeviceId,
    },

    /// Another transfer of the same component is in flight.
    #[error("Component {0} is already being operated on")]
    ComponentBeingOperatedOn(ComponentId),
}

impl TransferError {
    /// Component the rejected request was about, when the error names one.
    pub fn component(&self) -> Option<ComponentId> {
        match self {
            Self::MalformedTransfer(c) | Self::ComponentBeingOperatedOn(c) => Some(*c),
            Self::ComponentNotResident { component, .. }
            | Self::ComponentAlreadyPlaced { component, .. }
            | Self::ComponentDoesNotNeedTransfer { component, .. } => Some(*component),
            Self::UnknownDevice(_) => None,
        }
    }
}
