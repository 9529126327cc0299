//! Validation and bookkeeping around admission.

use std::sync::Arc;
use std::time::Duration;

use stowage_foundation::StorageSystem;
use stowage_kernel::config::load_config;
use stowage_kernel::{ComponentId, DeviceId, StorageConfig, TransferError};
use stowage_testing::{
    PrepareGate, RecordingTransfer, assert_transfer_complete, spawn_transfer, storage,
};

const PATIENCE: Duration = Duration::from_secs(10);

fn dev(id: u64) -> DeviceId {
    DeviceId::new(id)
}

fn comp(id: u64) -> ComponentId {
    ComponentId::new(id)
}

#[test]
fn rejections_leave_state_unchanged() {
    let system = storage(&[(1, 1), (2, 1)], &[(101, 1), (102, 2)]);
    let before = system.snapshot();

    let err = system.execute(&RecordingTransfer::remove(101, 2)).unwrap_err();
    assert_eq!(
        err,
        TransferError::ComponentNotResident {
            component: comp(101),
            device: dev(2),
        }
    );

    let err = system.execute(&RecordingTransfer::add(102, 1)).unwrap_err();
    assert_eq!(
        err,
        TransferError::ComponentAlreadyPlaced {
            component: comp(102),
            device: dev(2),
        }
    );

    let err = system.execute(&RecordingTransfer::new(5, None, None)).unwrap_err();
    assert_eq!(err, TransferError::MalformedTransfer(comp(5)));

    let err = system.execute(&RecordingTransfer::add(5, 9)).unwrap_err();
    assert_eq!(err, TransferError::UnknownDevice(dev(9)));

    let err = system.execute(&RecordingTransfer::relocate(102, 2, 2)).unwrap_err();
    assert!(matches!(err, TransferError::ComponentDoesNotNeedTransfer { .. }));

    assert_eq!(system.snapshot(), before);
    let metrics = system.metrics().snapshot();
    assert_eq!((metrics.admitted, metrics.rejected), (0, 5));
}

#[test]
fn second_request_for_busy_component_is_rejected() {
    let system = storage(&[(1, 1), (2, 1)], &[(101, 1)]);
    let gate = PrepareGate::new();
    let stalled = Arc::new(RecordingTransfer::relocate(101, 1, 2).with_gate(&gate));

    let handle = spawn_transfer(&system, &stalled);
    assert_eq!(gate.wait_entered(PATIENCE), Some(comp(101)));
    assert_eq!(system.snapshot().in_flight, vec![comp(101)]);

    let second = RecordingTransfer::remove(101, 1);
    assert_eq!(
        system.execute(&second).unwrap_err(),
        TransferError::ComponentBeingOperatedOn(comp(101))
    );
    assert_eq!(second.prepare_count(), 0);

    gate.open();
    handle.join(PATIENCE).unwrap();
    assert_transfer_complete!(stalled);

    // Once committed the component is free to move again.
    system.execute(&RecordingTransfer::relocate(101, 2, 1)).unwrap();
    assert_eq!(system.snapshot().location(comp(101)), Some(dev(1)));
}

#[test]
fn churn_returns_devices_to_original_occupancy() {
    let system = storage(&[(1, 4), (2, 4)], &[(1, 1)]);
    let before = system.snapshot();
    let ids: Vec<u64> = (500..506).collect();

    let adds: Vec<_> = ids
        .iter()
        .map(|&id| Arc::new(RecordingTransfer::add(id, 1 + id % 2)))
        .collect();
    let handles: Vec<_> = adds.iter().map(|t| spawn_transfer(&system, t)).collect();
    for handle in handles {
        handle.join(PATIENCE).unwrap();
    }
    assert_eq!(system.snapshot().placement.len(), 1 + ids.len());

    let removes: Vec<_> = ids
        .iter()
        .map(|&id| Arc::new(RecordingTransfer::remove(id, 1 + id % 2)))
        .collect();
    let handles: Vec<_> = removes.iter().map(|t| spawn_transfer(&system, t)).collect();
    for handle in handles {
        handle.join(PATIENCE).unwrap();
    }

    for transfer in adds.iter().chain(&removes) {
        assert_transfer_complete!(transfer);
    }
    let after = system.snapshot();
    assert_eq!(after, before);
    assert!(ids.iter().all(|&id| after.location(comp(id)).is_none()));
}

#[test]
fn engine_built_from_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("storage.yaml");
    std::fs::write(
        &path,
        r#"
devices:
  - id: 1
    capacity: 1
  - id: 2
    capacity: 1
components:
  - id: 101
    device: 1
  - id: 102
    device: 2
tuning:
  starvation_warn_threshold: 2
"#,
    )
    .unwrap();

    let config: StorageConfig = load_config(path.to_str().unwrap()).unwrap();
    let system = Arc::new(StorageSystem::from_config(&config).unwrap());

    let a = Arc::new(RecordingTransfer::relocate(101, 1, 2));
    let b = Arc::new(RecordingTransfer::relocate(102, 2, 1));
    let handles = [spawn_transfer(&system, &a), spawn_transfer(&system, &b)];
    for handle in handles {
        handle.join(PATIENCE).unwrap();
    }
    assert_eq!(system.snapshot().location(comp(101)), Some(dev(2)));
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = StorageConfig::new()
        .with_device(1, 1)
        .with_component(101, 1)
        .with_component(102, 1);
    assert!(StorageSystem::from_config(&config).is_err());
}
