use std::fmt;
use std::sync::{Arc, RwLock};

use crate::event::{EventType, SecurityEvent, ThreatLevel};

/// Outcome applied to an event. Default when no rule matches is `Allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Allow,
    Deny,
    Quarantine,
    AlertOnly,
    Custom,
}

/// A predicate over an event returning bool, wrapped so `SecurityRule` stays
/// cheaply clonable (rules are shared, never mutated in place).
pub type CustomCondition = Arc<dyn Fn(&SecurityEvent) -> bool + Send + Sync>;

/// An element of the ordered rule store.
#[derive(Clone)]
pub struct SecurityRule {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub event_type: EventType,
    /// Substring matched against both `target_path` and `process_path`.
    /// Empty matches all.
    pub pattern: String,
    pub min_threat_level: ThreatLevel,
    pub action: ActionKind,
    pub custom_condition: Option<CustomCondition>,
}

impl fmt::Debug for SecurityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityRule")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("enabled", &self.enabled)
            .field("event_type", &self.event_type)
            .field("pattern", &self.pattern)
            .field("min_threat_level", &self.min_threat_level)
            .field("action", &self.action)
            .field("custom_condition", &self.custom_condition.is_some())
            .finish()
    }
}

impl SecurityRule {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        event_type: EventType,
        pattern: impl Into<String>,
        min_threat_level: ThreatLevel,
        action: ActionKind,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            enabled: true,
            event_type,
            pattern: pattern.into(),
            min_threat_level,
            action,
            custom_condition: None,
        }
    }

    pub fn with_custom_condition(mut self, condition: CustomCondition) -> Self {
        self.custom_condition = Some(condition);
        self
    }
}

/// Ordered, mutable container of rules. Iteration order is insertion order
/// and is the match order. No uniqueness check on name at insertion — the
/// source code this is grounded on tolerates duplicates, and callers that
/// want uniqueness should check `list()` themselves before adding.
pub struct RuleStore {
    rules: RwLock<Vec<SecurityRule>>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, rule: SecurityRule) {
        self.rules.write().unwrap().push(rule);
    }

    /// Deletes all rules with the given name. Returns whether any were
    /// removed.
    pub fn remove_by_name(&self, name: &str) -> bool {
        let mut rules = self.rules.write().unwrap();
        let before = rules.len();
        rules.retain(|r| r.name != name);
        rules.len() != before
    }

    pub fn list(&self) -> Vec<SecurityRule> {
        self.rules.read().unwrap().clone()
    }

    /// Seeds the store with the built-in default rules.
    pub fn load_defaults(&self) {
        self.add(SecurityRule::new(
            "Suspicious Process Execution",
            "Detect execution of suspicious processes",
            EventType::ProcessCreation,
            "",
            ThreatLevel::Medium,
            ActionKind::AlertOnly,
        ));

        self.add(SecurityRule::new(
            "Critical File Access",
            "Monitor access to critical system files",
            EventType::FileAccess,
            "System32",
            ThreatLevel::High,
            ActionKind::AlertOnly,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_by_name_restores_prior_state() {
        let store = RuleStore::new();
        let before = store.list();

        store.add(SecurityRule::new(
            "temp",
            "",
            EventType::FileAccess,
            "",
            ThreatLevel::Low,
            ActionKind::Deny,
        ));
        assert!(store.remove_by_name("temp"));

        assert_eq!(before.len(), store.list().len());
        assert!(!store.remove_by_name("temp"));
    }

    #[test]
    fn duplicates_tolerated_on_insert() {
        let store = RuleStore::new();
        for _ in 0..2 {
            store.add(SecurityRule::new(
                "dup",
                "",
                EventType::FileAccess,
                "",
                ThreatLevel::Low,
                ActionKind::Allow,
            ));
        }
        assert_eq!(store.list().iter().filter(|r| r.name == "dup").count(), 2);
    }
}
