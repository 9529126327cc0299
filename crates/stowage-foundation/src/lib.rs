//! Stowage Foundation
//!
//! Concrete implementation of the slot-migration engine defined by the
//! contracts in `stowage-kernel`.

pub mod storage;

pub use storage::{
    DeviceSnapshot, StorageMetrics, StorageMetricsSnapshot, StorageSnapshot, StorageSystem,
};
