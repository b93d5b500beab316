use crate::event::{SecurityEvent, ThreatLevel};

use super::CorrelationType;

fn type_weight(correlation_type: CorrelationType) -> f64 {
    match correlation_type {
        CorrelationType::ProcessBased => 0.2,
        CorrelationType::TargetBased => 0.25,
        CorrelationType::SequenceBased => 0.3,
        CorrelationType::ThreatEscalation => 0.3,
        CorrelationType::TimeBased => 0.15,
    }
}

/// Confidence score in [0, 1] for a candidate group of events.
pub fn score(events: &[SecurityEvent], correlation_type: CorrelationType) -> f64 {
    if events.is_empty() {
        return 0.0;
    }

    let size_contribution = (events.len() as f64 / 10.0).min(0.3);

    let severe = events
        .iter()
        .filter(|e| matches!(e.threat_level, ThreatLevel::High | ThreatLevel::Critical))
        .count();
    let severity_contribution = (severe as f64 / events.len() as f64) * 0.4;

    let total = size_contribution + severity_contribution + type_weight(correlation_type);
    total.min(1.0)
}

/// Derives one severity for a whole group per the escalation rules: two or
/// more Critical events, or one Critical plus two High, forces Critical;
/// three or more High also forces Critical; otherwise a large-enough group
/// is promoted one step past its plain maximum.
pub fn combined_threat_level(events: &[SecurityEvent]) -> ThreatLevel {
    let max = events
        .iter()
        .map(|e| e.threat_level)
        .max()
        .unwrap_or(ThreatLevel::Low);

    let critical = events.iter().filter(|e| e.threat_level == ThreatLevel::Critical).count();
    let high = events.iter().filter(|e| e.threat_level == ThreatLevel::High).count();

    if critical >= 2 || (critical >= 1 && high >= 2) {
        return ThreatLevel::Critical;
    }
    if high >= 3 {
        return ThreatLevel::Critical;
    }
    if events.len() >= 5 && max != ThreatLevel::Critical {
        return promote(max);
    }
    max
}

fn promote(level: ThreatLevel) -> ThreatLevel {
    match level {
        ThreatLevel::Low => ThreatLevel::Medium,
        ThreatLevel::Medium => ThreatLevel::High,
        ThreatLevel::High => ThreatLevel::Critical,
        ThreatLevel::Critical => ThreatLevel::Critical,
    }
}
