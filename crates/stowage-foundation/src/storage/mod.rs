//! Concurrent slot-migration engine.
//!
//! # Architecture
//!
//! All bookkeeping lives in one protected aggregate, the world state, behind a
//! single fair `parking_lot::Mutex`. Slot records and wait entries are arena
//! records addressed by stable handles; ownership of a slot moves between
//! threads by rewriting the record, never by moving it.
//!
//! A request obtains its destination slot in one of three ways:
//!
//! - **Fast path**: unused capacity, or a slot whose owner is leaving and
//!   has no successor yet.
//! - **Cycle closing** (moves only): queued moves that, together with this
//!   one, form a rotation are consumed at once and every participant is
//!   promised the slot of the next.
//! - **Wait path**: the request queues on the destination and is woken with a
//!   slot assigned by whoever vacates one.
//!
//! Every admitted request then runs the two-phase hand-off: vacate the source
//! slot, `prepare`, signal the successor, wait for the promised destination
//! slot, bind it, `perform`, commit.
//!
//! Cycle closing serves queued moves out of arrival order. That is the price
//! of liveness for rotations; [`DeviceSnapshot::queue_bypasses`] and a `warn`
//! event expose how often it happens on each device.

mod cycle;
mod handoff;
mod metrics;
mod snapshot;
mod system;
mod world;

pub use metrics::{StorageMetrics, StorageMetricsSnapshot};
pub use snapshot::{DeviceSnapshot, StorageSnapshot};
pub use system::StorageSystem;
