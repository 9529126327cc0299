//! Gate that holds `prepare` callbacks until a test lets them through.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

use stowage_kernel::ComponentId;

#[derive(Debug)]
struct Inner {
    open: Mutex<bool>,
    cv: Condvar,
    entered_tx: Sender<ComponentId>,
    entered_rx: Receiver<ComponentId>,
}

/// Blocks every transfer that passes through it until [`open`](Self::open).
///
/// Each arrival is reported on a channel so tests can wait for a transfer to
/// reach its `prepare` without sleeping.
#[derive(Debug, Clone)]
pub struct PrepareGate {
    inner: Arc<Inner>,
}

impl Default for PrepareGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PrepareGate {
    pub fn new() -> Self {
        let (entered_tx, entered_rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                open: Mutex::new(false),
                cv: Condvar::new(),
                entered_tx,
                entered_rx,
            }),
        }
    }

    /// Called from `prepare`: announce arrival, then wait for the gate.
    pub fn pass(&self, component: ComponentId) {
        // The receiver lives in `inner`, so the send cannot fail.
        let _ = self.inner.entered_tx.send(component);
        tracing::debug!(%component, "held at prepare gate");

        let mut open = self.inner.open.lock();
        while !*open {
            self.inner.cv.wait(&mut open);
        }
    }

    pub fn open(&self) {
        *self.inner.open.lock() = true;
        self.inner.cv.notify_all();
    }

    /// Next component to reach the gate, if one arrives within `timeout`.
    pub fn wait_entered(&self, timeout: Duration) -> Option<ComponentId> {
        self.inner.entered_rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn holds_until_opened() {
        let gate = PrepareGate::new();
        let passer = {
            let gate = gate.clone();
            thread::spawn(move || gate.pass(ComponentId::new(9)))
        };

        assert_eq!(
            gate.wait_entered(Duration::from_secs(5)),
            Some(ComponentId::new(9))
        );
        thread::sleep(Duration::from_millis(20));
        assert!(!passer.is_finished());

        gate.open();
        passer.join().unwrap();
    }

    #[test]
    fn open_gate_does_not_block() {
        let gate = PrepareGate::new();
        gate.open();
        gate.pass(ComponentId::new(1));
        assert_eq!(
            gate.wait_entered(Duration::from_millis(10)),
            Some(ComponentId::new(1))
        );
        assert_eq!(gate.wait_entered(Duration::from_millis(10)), None);
    }
}
