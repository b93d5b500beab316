use std::collections::HashMap;
use std::sync::Mutex;

use crate::event::EventType;

/// Per-type event counters. Overflow is not guarded — events per host
/// lifetime fit comfortably in 64 bits.
pub struct StatisticsRegistry {
    counts: Mutex<HashMap<EventType, u64>>,
}

impl Default for StatisticsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsRegistry {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn increment(&self, event_type: EventType) {
        let mut counts = self.counts.lock().unwrap();
        *counts.entry(event_type).or_insert(0) = counts.get(&event_type).copied().unwrap_or(0).wrapping_add(1);
    }

    pub fn count(&self, event_type: EventType) -> u64 {
        self.counts.lock().unwrap().get(&event_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.lock().unwrap().values().fold(0u64, |acc, n| acc.wrapping_add(*n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_equals_sum_of_counts() {
        let stats = StatisticsRegistry::new();
        stats.increment(EventType::FileAccess);
        stats.increment(EventType::FileAccess);
        stats.increment(EventType::ProcessCreation);

        assert_eq!(stats.count(EventType::FileAccess), 2);
        assert_eq!(stats.count(EventType::ProcessCreation), 1);
        assert_eq!(stats.total(), 3);
    }
}
