//! Storage system configuration model.

use error_stack::Report;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{ConfigError, ConfigResult};
use crate::ids::{ComponentId, DeviceId};

/// One device and its fixed slot capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: DeviceId,
    pub capacity: usize,
}

/// Initial placement of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub id: ComponentId,
    pub device: DeviceId,
}

/// Engine knobs that do not affect correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    /// Out-of-order queue consumptions on one device (by cycle closing) after
    /// which a fairness warning is logged. Reset by every FIFO hand-off.
    pub starvation_warn_threshold: u32,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            starvation_warn_threshold: 8,
        }
    }
}

impl EngineTuning {
    pub fn with_starvation_warn_threshold(mut self, threshold: u32) -> Self {
        self.starvation_warn_threshold = threshold;
        self
    }
}

/// Full construction input for a storage system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub tuning: EngineTuning,
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, id: u64, capacity: usize) -> Self {
        self.devices.push(DeviceSpec {
            id: DeviceId::new(id),
            capacity,
        });
        self
    }

    pub fn with_component(mut self, id: u64, device: u64) -> Self {
        self.components.push(ComponentSpec {
            id: ComponentId::new(id),
            device: DeviceId::new(device),
        });
        self
    }

    pub fn with_tuning(mut self, tuning: EngineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Build a config from the two construction maps.
    pub fn from_maps(
        capacities: &HashMap<DeviceId, usize>,
        placement: &HashMap<ComponentId, DeviceId>,
    ) -> Self {
        let mut devices: Vec<DeviceSpec> = capacities
            .iter()
            .map(|(&id, &capacity)| DeviceSpec { id, capacity })
            .collect();
        devices.sort_by_key(|d| d.id);

        let mut components: Vec<ComponentSpec> = placement
            .iter()
            .map(|(&id, &device)| ComponentSpec { id, device })
            .collect();
        components.sort_by_key(|c| c.id);

        Self {
            devices,
            components,
            tuning: EngineTuning::default(),
        }
    }

    /// Check the construction contract and return the validated maps.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptySystem`] when no device is declared
    /// - [`ConfigError::DuplicateDevice`] / [`ConfigError::DuplicateComponent`]
    /// - [`ConfigError::InvalidCapacity`] for a zero capacity
    /// - [`ConfigError::UnknownDevice`] when a component references an undeclared device
    /// - [`ConfigError::CapacityExceeded`] when a device is over-filled initially
    pub fn validate(
        &self,
    ) -> ConfigResult<(BTreeMap<DeviceId, usize>, BTreeMap<ComponentId, DeviceId>)> {
        if self.devices.is_empty() {
            return Err(Report::new(ConfigError::EmptySystem));
        }

        let mut capacities = BTreeMap::new();
        for spec in &self.devices {
            if spec.capacity == 0 {
                return Err(Report::new(ConfigError::InvalidCapacity(spec.id))
                    .attach(format!("declared capacity: {}", spec.capacity)));
            }
            if capacities.insert(spec.id, spec.capacity).is_some() {
                return Err(Report::new(ConfigError::DuplicateDevice(spec.id)));
            }
        }

        let mut placement = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut occupancy: BTreeMap<DeviceId, usize> = BTreeMap::new();
        for spec in &self.components {
            if !seen.insert(spec.id) {
                return Err(Report::new(ConfigError::DuplicateComponent(spec.id)));
            }
            let Some(&capacity) = capacities.get(&spec.device) else {
                return Err(Report::new(ConfigError::UnknownDevice {
                    component: spec.id,
                    device: spec.device,
                }));
            };
            let placed = occupancy.entry(spec.device).or_insert(0);
            *placed += 1;
            if *placed > capacity {
                return Err(Report::new(ConfigError::CapacityExceeded {
                    device: spec.device,
                    capacity,
                    placed: *placed,
                })
                .attach(format!("while placing {}", spec.id)));
            }
            placement.insert(spec.id, spec.device);
        }

        tracing::debug!(
            devices = capacities.len(),
            components = placement.len(),
            "storage configuration validated"
        );
        Ok((capacities, placement))
    }
}
