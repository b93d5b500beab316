use std::sync::Mutex;

use tracing::warn;

use crate::event::SecurityEvent;

/// A raised alert: the event that triggered it, the message describing the
/// policy outcome, and whether an operator has acknowledged it.
#[derive(Debug, Clone)]
pub struct Alert {
    pub event: SecurityEvent,
    pub message: String,
    pub acknowledged: bool,
}

/// In-memory alert log. Alerts accumulate until acknowledged or cleared;
/// nothing ever expires them on its own.
pub struct AlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl Default for AlertSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSink {
    pub fn new() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn raise(&self, event: SecurityEvent, message: impl Into<String>) {
        let message = message.into();
        warn!(target = %event.target_path, %message, "alert raised");
        self.alerts.lock().unwrap().push(Alert {
            event,
            message,
            acknowledged: false,
        });
    }

    pub fn list(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    /// Marks the alert at `index` acknowledged. Returns whether it existed.
    pub fn acknowledge(&self, index: usize) -> bool {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.get_mut(index) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.alerts.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, ThreatLevel};

    fn event() -> SecurityEvent {
        SecurityEvent::new(EventType::FileAccess, ThreatLevel::High, 1, 1, "", "/etc/shadow", "")
    }

    #[test]
    fn acknowledge_marks_existing_alert() {
        let sink = AlertSink::new();
        sink.raise(event(), "denied");
        assert!(sink.acknowledge(0));
        assert!(sink.list()[0].acknowledged);
        assert!(!sink.acknowledge(1));
    }

    #[test]
    fn clear_empties_the_log() {
        let sink = AlertSink::new();
        sink.raise(event(), "denied");
        sink.clear();
        assert!(sink.list().is_empty());
    }
}
