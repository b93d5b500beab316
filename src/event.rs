use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of activity a monitor observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    FileAccess,
    FileModification,
    FileDeletion,
    ProcessCreation,
    ProcessTermination,
    NetworkConnection,
    RegistryModification,
    MemoryInjection,
    ExploitAttempt,
}

/// Ordered severity. `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// An immutable record produced by a monitor. `threat_level` is assigned by
/// the producing monitor and never mutated downstream — every later
/// component treats it as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_type: EventType,
    pub threat_level: ThreatLevel,
    pub process_id: u32,
    pub thread_id: u32,
    pub process_path: String,
    pub target_path: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl SecurityEvent {
    pub fn new(
        event_type: EventType,
        threat_level: ThreatLevel,
        process_id: u32,
        thread_id: u32,
        process_path: impl Into<String>,
        target_path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            threat_level,
            process_id,
            thread_id,
            process_path: process_path.into(),
            target_path: target_path.into(),
            description: description.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The originator path to use when a monitor cannot resolve one.
    pub fn unknown_process_path() -> &'static str {
        "Unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_level_ordering() {
        assert!(ThreatLevel::Low < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }

    #[test]
    fn structural_equality() {
        let a = SecurityEvent::new(
            EventType::ProcessCreation,
            ThreatLevel::Medium,
            100,
            1,
            "/bin/sh",
            "",
            "spawned",
        );
        let mut b = a.clone();
        assert_eq!(a, b);
        b.description = "changed".into();
        assert_ne!(a, b);
    }
}
