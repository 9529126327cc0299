use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use stowage_kernel::{ComponentId, ComponentTransfer, DeviceId};

use crate::gate::PrepareGate;

/// Which callback ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Perform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub component: ComponentId,
    pub phase: Phase,
}

/// Shared, ordered record of callbacks across many transfers.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, component: ComponentId, phase: Phase) {
        self.events.lock().push(Event { component, phase });
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Index of the first matching event.
    pub fn position(&self, component: u64, phase: Phase) -> Option<usize> {
        let component = ComponentId::new(component);
        self.events
            .lock()
            .iter()
            .position(|e| e.component == component && e.phase == phase)
    }

    /// True when both events were logged and `first` came before `second`.
    pub fn happened_before(&self, first: (u64, Phase), second: (u64, Phase)) -> bool {
        match (
            self.position(first.0, first.1),
            self.position(second.0, second.1),
        ) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }
}

/// A mock transfer that checks the callback contract as it runs.
///
/// Panics if `prepare` or `perform` runs twice, if `perform` runs before
/// `prepare`, or if the two run on different threads.
#[derive(Debug)]
pub struct RecordingTransfer {
    component: ComponentId,
    source: Option<DeviceId>,
    destination: Option<DeviceId>,
    prepared: AtomicUsize,
    performed: AtomicUsize,
    thread: Mutex<Option<ThreadId>>,
    log: Option<EventLog>,
    gate: Option<PrepareGate>,
    delay: Duration,
}

impl RecordingTransfer {
    pub fn new(component: u64, source: Option<u64>, destination: Option<u64>) -> Self {
        Self {
            component: ComponentId::new(component),
            source: source.map(DeviceId::new),
            destination: destination.map(DeviceId::new),
            prepared: AtomicUsize::new(0),
            performed: AtomicUsize::new(0),
            thread: Mutex::new(None),
            log: None,
            gate: None,
            delay: Duration::ZERO,
        }
    }

    pub fn add(component: u64, destination: u64) -> Self {
        Self::new(component, None, Some(destination))
    }

    pub fn remove(component: u64, source: u64) -> Self {
        Self::new(component, Some(source), None)
    }

    pub fn relocate(component: u64, source: u64, destination: u64) -> Self {
        Self::new(component, Some(source), Some(destination))
    }

    pub fn with_log(mut self, log: &EventLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    /// Block `prepare` until the gate opens.
    pub fn with_gate(mut self, gate: &PrepareGate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    /// Sleep this long inside each callback.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn prepare_count(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }

    pub fn perform_count(&self) -> usize {
        self.performed.load(Ordering::SeqCst)
    }

    /// Both callbacks ran exactly once.
    pub fn is_complete(&self) -> bool {
        self.prepare_count() == 1 && self.perform_count() == 1
    }

    fn check_thread(&self) {
        let current = thread::current().id();
        let mut owner = self.thread.lock();
        match *owner {
            Some(id) => assert_eq!(
                id, current,
                "{} callbacks ran on different threads",
                self.component
            ),
            None => *owner = Some(current),
        }
    }
}

impl ComponentTransfer for RecordingTransfer {
    fn component_id(&self) -> ComponentId {
        self.component
    }

    fn source_device_id(&self) -> Option<DeviceId> {
        self.source
    }

    fn destination_device_id(&self) -> Option<DeviceId> {
        self.destination
    }

    fn prepare(&self) {
        self.check_thread();
        let before = self.prepared.fetch_add(1, Ordering::SeqCst);
        assert_eq!(before, 0, "{} prepared more than once", self.component);
        assert_eq!(self.perform_count(), 0, "{} performed before prepare", self.component);

        if let Some(log) = &self.log {
            log.record(self.component, Phase::Prepare);
        }
        if let Some(gate) = &self.gate {
            gate.pass(self.component);
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }

    fn perform(&self) {
        self.check_thread();
        assert_eq!(self.prepare_count(), 1, "{} performed without prepare", self.component);
        let before = self.performed.fetch_add(1, Ordering::SeqCst);
        assert_eq!(before, 0, "{} performed more than once", self.component);

        if let Some(log) = &self.log {
            log.record(self.component, Phase::Perform);
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_both_phases_in_order() {
        let log = EventLog::new();
        let transfer = RecordingTransfer::relocate(5, 1, 2).with_log(&log);
        transfer.prepare();
        transfer.perform();

        assert!(transfer.is_complete());
        assert!(log.happened_before((5, Phase::Prepare), (5, Phase::Perform)));
        assert_eq!(log.events().len(), 2);
    }

    #[test]
    #[should_panic(expected = "performed without prepare")]
    fn perform_first_panics() {
        RecordingTransfer::add(5, 1).perform();
    }

    #[test]
    #[should_panic(expected = "prepared more than once")]
    fn double_prepare_panics() {
        let transfer = RecordingTransfer::remove(5, 1);
        transfer.prepare();
        transfer.prepare();
    }

    #[test]
    fn other_thread_is_detected() {
        let transfer = Arc::new(RecordingTransfer::add(5, 1));
        transfer.prepare();
        let result = {
            let transfer = Arc::clone(&transfer);
            thread::spawn(move || transfer.perform()).join()
        };
        assert!(result.is_err());
    }
}
