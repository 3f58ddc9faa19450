//! Level-triggered alert gate

use tracing::debug;

/// Receiver of alert transitions (a sound service, a recorder in tests)
pub trait AlertSink {
    fn set_alert(&mut self, active: bool);
}

impl<F: FnMut(bool)> AlertSink for F {
    fn set_alert(&mut self, active: bool) {
        self(active)
    }
}

/// Thresholds the raw per-block RMS and forwards start/stop to a sink.
///
/// There is no hysteresis: a signal hovering around the threshold toggles
/// the alert on every crossing. The sink only sees actual transitions, so
/// repeated starts or stops are no-ops.
pub struct AlertGate {
    threshold: f64,
    active: bool,
    sink: Box<dyn AlertSink>,
}

impl AlertGate {
    pub fn new(threshold: f64, sink: Box<dyn AlertSink>) -> Self {
        Self {
            threshold,
            active: false,
            sink,
        }
    }

    /// Feed one unsmoothed block value; returns whether the alert is active
    pub fn update(&mut self, raw_block_value: f64) -> bool {
        if raw_block_value > self.threshold {
            self.activate();
        } else {
            self.deactivate();
        }
        self.active
    }

    pub fn activate(&mut self) {
        if !self.active {
            debug!("Alert on");
            self.active = true;
            self.sink.set_alert(true);
        }
    }

    pub fn deactivate(&mut self) {
        if self.active {
            debug!("Alert off");
            self.active = false;
            self.sink.set_alert(false);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Drop for AlertGate {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_sink() -> (Rc<RefCell<Vec<bool>>>, Box<dyn AlertSink>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink_calls = Rc::clone(&calls);
        let sink = move |active: bool| sink_calls.borrow_mut().push(active);
        (calls, Box::new(sink))
    }

    #[test]
    fn test_threshold_is_strict() {
        let (_, sink) = recording_sink();
        let mut gate = AlertGate::new(0.06, sink);
        assert!(!gate.update(0.06));
        assert!(gate.update(0.0600001));
        assert!(!gate.update(0.01));
    }

    #[test]
    fn test_activate_is_idempotent() {
        let (calls, sink) = recording_sink();
        let mut gate = AlertGate::new(0.06, sink);
        gate.activate();
        gate.activate();
        assert!(gate.is_active());
        assert_eq!(*calls.borrow(), vec![true]);
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let (calls, sink) = recording_sink();
        let mut gate = AlertGate::new(0.06, sink);
        gate.deactivate();
        assert!(calls.borrow().is_empty());

        gate.activate();
        gate.deactivate();
        gate.deactivate();
        assert_eq!(*calls.borrow(), vec![true, false]);
    }

    #[test]
    fn test_sink_sees_only_transitions() {
        let (calls, sink) = recording_sink();
        let mut gate = AlertGate::new(0.06, sink);
        for value in [0.01, 0.1, 0.2, 0.3, 0.02, 0.01, 0.07] {
            gate.update(value);
        }
        assert_eq!(*calls.borrow(), vec![true, false, true]);
    }

    #[test]
    fn test_drop_stops_active_alert() {
        let (calls, sink) = recording_sink();
        let mut gate = AlertGate::new(0.06, sink);
        gate.update(1.0);
        drop(gate);
        assert_eq!(*calls.borrow(), vec![true, false]);
    }
}
