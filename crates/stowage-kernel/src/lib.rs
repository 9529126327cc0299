//! Stowage Kernel
//!
//! Contracts shared by every part of the stowage engine:
//!
//! - [`ids`]: opaque device and component identifiers
//! - [`transfer`]: the [`ComponentTransfer`] descriptor supplied by callers
//! - [`error`]: runtime transfer errors
//! - [`config`]: construction-time configuration model and file loader
//! - [`logging`]: `tracing` subscriber setup
//!
//! Concrete engines live in `stowage-foundation`; the kernel never depends on it.

// identifier module
pub mod ids;
pub use ids::{ComponentId, DeviceId};

// transfer contract module
pub mod transfer;
pub use transfer::{ComponentTransfer, TransferKind, TransferRequest};

// error module
pub mod error;
pub use error::TransferError;

// config module
pub mod config;
pub use config::{
    ComponentSpec, ConfigError, ConfigResult, DeviceSpec, EngineTuning, StorageConfig,
};

// logging module
pub mod logging;
