use std::sync::Arc;

use crate::event::{EventType, SecurityEvent};
use crate::rules::{ActionKind, RuleStore};

/// Maps an event to an action by walking the rule store in order and
/// returning the first match; `Allow` if nothing matches.
pub struct PolicyEvaluator {
    rules: Arc<RuleStore>,
}

impl PolicyEvaluator {
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self { rules }
    }

    pub fn evaluate(&self, event: &SecurityEvent) -> ActionKind {
        for rule in self.rules.list() {
            if !rule.enabled {
                continue;
            }

            // The source treats FileAccess as a wildcard event type. This
            // looks like a missing `Any` variant but several default rules
            // rely on it — preserved verbatim.
            let type_matches =
                rule.event_type == event.event_type || rule.event_type == EventType::FileAccess;
            if !type_matches {
                continue;
            }

            if event.threat_level < rule.min_threat_level {
                continue;
            }

            let pattern_matches = rule.pattern.is_empty()
                || event.target_path.contains(&rule.pattern)
                || event.process_path.contains(&rule.pattern);
            if !pattern_matches {
                continue;
            }

            if let Some(condition) = &rule.custom_condition {
                if !condition(event) {
                    continue;
                }
            }

            return rule.action;
        }

        ActionKind::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ThreatLevel;
    use crate::rules::SecurityRule;

    fn event(event_type: EventType, threat_level: ThreatLevel, target: &str, path: &str) -> SecurityEvent {
        SecurityEvent::new(event_type, threat_level, 1, 1, path, target, "")
    }

    #[test]
    fn empty_store_allows_everything() {
        let store = Arc::new(RuleStore::new());
        let evaluator = PolicyEvaluator::new(store);
        let e = event(EventType::ProcessCreation, ThreatLevel::Critical, "", "/bin/x");
        assert_eq!(evaluator.evaluate(&e), ActionKind::Allow);
    }

    #[test]
    fn empty_pattern_matches_all_events_of_type() {
        let store = Arc::new(RuleStore::new());
        store.add(SecurityRule::new(
            "r",
            "",
            EventType::ProcessCreation,
            "",
            ThreatLevel::Low,
            ActionKind::Deny,
        ));
        let evaluator = PolicyEvaluator::new(store);
        let e = event(EventType::ProcessCreation, ThreatLevel::Low, "anything", "anything");
        assert_eq!(evaluator.evaluate(&e), ActionKind::Deny);
    }

    #[test]
    fn file_access_rule_is_a_wildcard() {
        let store = Arc::new(RuleStore::new());
        store.add(SecurityRule::new(
            "wildcard",
            "",
            EventType::FileAccess,
            "",
            ThreatLevel::Low,
            ActionKind::Quarantine,
        ));
        let evaluator = PolicyEvaluator::new(store);
        let e = event(EventType::NetworkConnection, ThreatLevel::Low, "", "");
        assert_eq!(evaluator.evaluate(&e), ActionKind::Quarantine);
    }

    #[test]
    fn first_matching_rule_wins() {
        let store = Arc::new(RuleStore::new());
        store.add(SecurityRule::new(
            "first",
            "",
            EventType::ProcessCreation,
            "",
            ThreatLevel::Low,
            ActionKind::Deny,
        ));
        store.add(SecurityRule::new(
            "second",
            "",
            EventType::ProcessCreation,
            "",
            ThreatLevel::Low,
            ActionKind::AlertOnly,
        ));
        let evaluator = PolicyEvaluator::new(store);
        let e = event(EventType::ProcessCreation, ThreatLevel::Low, "", "");
        assert_eq!(evaluator.evaluate(&e), ActionKind::Deny);
    }
}
