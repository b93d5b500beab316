use std::collections::HashSet;

use crate::event::EventType;

/// Checks the observed event types against the two known multi-stage
/// attack chains. Memory injection takes precedence in the description
/// when both match.
pub fn matches_attack_pattern(types: &HashSet<EventType>) -> bool {
    persistence_chain(types) || injection_chain(types)
}

pub fn describe_attack_pattern(types: &HashSet<EventType>) -> &'static str {
    if injection_chain(types) {
        "Memory injection attack chain"
    } else if persistence_chain(types) {
        "Multi-stage persistence attack"
    } else {
        "Suspicious event sequence"
    }
}

fn persistence_chain(types: &HashSet<EventType>) -> bool {
    types.contains(&EventType::ProcessCreation)
        && (types.contains(&EventType::FileModification) || types.contains(&EventType::FileDeletion))
        && types.contains(&EventType::RegistryModification)
}

fn injection_chain(types: &HashSet<EventType>) -> bool {
    types.contains(&EventType::MemoryInjection)
        && (types.contains(&EventType::FileModification)
            || types.contains(&EventType::FileDeletion)
            || types.contains(&EventType::RegistryModification))
}
