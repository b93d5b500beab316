mod pattern;
mod score;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::event::{EventType, SecurityEvent, ThreatLevel};

/// Which detector produced a `CorrelatedEventGroup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationType {
    ProcessBased,
    TargetBased,
    TimeBased,
    SequenceBased,
    ThreatEscalation,
}

#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    pub time_window_seconds: u64,
    pub min_events_for_correlation: usize,
    pub min_correlation_score: f64,
    pub max_events_per_process: usize,
    pub max_correlation_groups: usize,
    pub process_based_enabled: bool,
    pub target_based_enabled: bool,
    pub time_based_enabled: bool,
    pub sequence_based_enabled: bool,
    pub threat_escalation_enabled: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            time_window_seconds: 60,
            min_events_for_correlation: 3,
            min_correlation_score: 0.6,
            max_events_per_process: 100,
            max_correlation_groups: 1000,
            process_based_enabled: true,
            target_based_enabled: true,
            time_based_enabled: true,
            sequence_based_enabled: true,
            threat_escalation_enabled: true,
        }
    }
}

/// An event tagged with the monotonic instant it was ingested at. The
/// monotonic stamp drives window pruning; `SecurityEvent::timestamp` (wall
/// clock) is what callers see in an emitted group.
#[derive(Clone)]
struct TrackedEvent(SecurityEvent, Instant);

/// A hypothesis that a set of events belongs to one attack chain.
#[derive(Debug, Clone)]
pub struct CorrelatedEventGroup {
    pub correlation_id: String,
    pub correlation_type: CorrelationType,
    pub events: Vec<SecurityEvent>,
    pub combined_threat_level: ThreatLevel,
    pub correlation_score: f64,
    pub first_event_time: DateTime<Utc>,
    pub last_event_time: DateTime<Utc>,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

fn build_group(
    id: String,
    correlation_type: CorrelationType,
    events: Vec<SecurityEvent>,
    correlation_score: f64,
    description: impl Into<String>,
    metadata: HashMap<String, String>,
) -> CorrelatedEventGroup {
    let first_event_time = events.iter().map(|e| e.timestamp).min().unwrap_or_else(Utc::now);
    let last_event_time = events.iter().map(|e| e.timestamp).max().unwrap_or_else(Utc::now);
    let combined_threat_level = score::combined_threat_level(&events);
    CorrelatedEventGroup {
        correlation_id: id,
        correlation_type,
        events,
        combined_threat_level,
        correlation_score,
        first_event_time,
        last_event_time,
        description: description.into(),
        metadata,
    }
}

/// The three concurrently maintained indices, all guarded by one lock so
/// ingestion and detection observe a consistent snapshot.
struct EventsState {
    per_process: HashMap<u32, VecDeque<TrackedEvent>>,
    per_target: HashMap<String, VecDeque<TrackedEvent>>,
    global_window: VecDeque<TrackedEvent>,
}

impl EventsState {
    fn new() -> Self {
        Self {
            per_process: HashMap::new(),
            per_target: HashMap::new(),
            global_window: VecDeque::new(),
        }
    }

    fn ingest(&mut self, event: &SecurityEvent, now: Instant, config: &CorrelationConfig) {
        self.global_window.push_back(TrackedEvent(event.clone(), now));

        let process_seq = self.per_process.entry(event.process_id).or_default();
        process_seq.push_back(TrackedEvent(event.clone(), now));
        while process_seq.len() > config.max_events_per_process {
            process_seq.pop_front();
        }

        if !event.target_path.is_empty() {
            let target_seq = self.per_target.entry(event.target_path.clone()).or_default();
            target_seq.push_back(TrackedEvent(event.clone(), now));
            while target_seq.len() > config.max_events_per_process {
                target_seq.pop_front();
            }
        }

        let window = Duration::from_secs(config.time_window_seconds);
        while let Some(front) = self.global_window.front() {
            if now.duration_since(front.1) > window {
                self.global_window.pop_front();
            } else {
                break;
            }
        }
    }

    fn within_window<'a>(
        entries: impl Iterator<Item = &'a TrackedEvent>,
        now: Instant,
        window: Duration,
    ) -> Vec<SecurityEvent> {
        entries
            .filter(|t| now.duration_since(t.1) <= window)
            .map(|t| t.0.clone())
            .collect()
    }
}

/// Stateful sliding-window detector. Consumes events as they're dispatched
/// and raises `CorrelatedEventGroup`s when one of five detectors fires.
pub struct CorrelationEngine {
    config: CorrelationConfig,
    events: Mutex<EventsState>,
    correlations: Mutex<Vec<CorrelatedEventGroup>>,
    callback: Mutex<Option<Box<dyn Fn(&CorrelatedEventGroup) + Send + Sync>>>,
    processed_event_count: AtomicU64,
    correlation_count: AtomicU64,
    id_counter: AtomicU64,
}

impl CorrelationEngine {
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            config,
            events: Mutex::new(EventsState::new()),
            correlations: Mutex::new(Vec::new()),
            callback: Mutex::new(None),
            processed_event_count: AtomicU64::new(0),
            correlation_count: AtomicU64::new(0),
            id_counter: AtomicU64::new(0),
        }
    }

    pub fn set_callback(&self, callback: impl Fn(&CorrelatedEventGroup) + Send + Sync + 'static) {
        *self.callback.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn processed_event_count(&self) -> u64 {
        self.processed_event_count.load(Ordering::SeqCst)
    }

    pub fn correlation_count(&self) -> u64 {
        self.correlation_count.load(Ordering::SeqCst)
    }

    pub fn active_groups(&self) -> Vec<CorrelatedEventGroup> {
        self.correlations.lock().unwrap().clone()
    }

    /// Never raises. Malformed events (no target_path) just skip the
    /// target index rather than failing.
    pub fn process(&self, event: SecurityEvent) -> Vec<CorrelatedEventGroup> {
        let now = Instant::now();

        let candidates = {
            let mut state = self.events.lock().unwrap();
            state.ingest(&event, now, &self.config);
            self.processed_event_count.fetch_add(1, Ordering::SeqCst);
            self.detect_correlations(&state, now)
        };

        let mut emitted = Vec::new();
        for candidate in candidates {
            if self.try_insert(candidate.clone()) {
                emitted.push(candidate);
            }
        }

        for group in &emitted {
            self.invoke_callback(group);
        }

        emitted
    }

    fn next_correlation_id(&self) -> String {
        let counter = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("CORR-{}-{}", Utc::now().timestamp_millis(), counter)
    }

    /// Rejects a candidate that agrees with an existing active group on
    /// type, event count, and the first event's process_id — intentional
    /// light deduplication (coarse on purpose; see design notes).
    fn try_insert(&self, candidate: CorrelatedEventGroup) -> bool {
        let mut active = self.correlations.lock().unwrap();

        let first_pid = candidate.events.first().map(|e| e.process_id);
        let is_duplicate = active.iter().any(|g| {
            g.correlation_type == candidate.correlation_type
                && g.events.len() == candidate.events.len()
                && g.events.first().map(|e| e.process_id) == first_pid
        });
        if is_duplicate {
            debug!(correlation_id = %candidate.correlation_id, "duplicate correlation group suppressed");
            return false;
        }

        active.push(candidate);
        while active.len() > self.config.max_correlation_groups {
            active.remove(0);
        }
        self.correlation_count.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Drops to the most recent 100 active groups.
    pub fn clear_old_correlations(&self) {
        let mut active = self.correlations.lock().unwrap();
        let len = active.len();
        if len > 100 {
            active.drain(0..len - 100);
        }
    }

    fn invoke_callback(&self, group: &CorrelatedEventGroup) {
        let callback = self.callback.lock().unwrap();
        if let Some(cb) = callback.as_ref() {
            cb(group);
        }
    }

    fn detect_correlations(&self, state: &EventsState, now: Instant) -> Vec<CorrelatedEventGroup> {
        let window = Duration::from_secs(self.config.time_window_seconds);
        let mut out = Vec::new();

        if self.config.process_based_enabled {
            out.extend(self.detect_process_based(state, now, window));
        }
        if self.config.time_based_enabled {
            if let Some(group) = self.detect_time_based(state, now, window) {
                out.push(group);
            }
        }
        if self.config.target_based_enabled {
            out.extend(self.detect_target_based(state, now, window));
        }
        if self.config.sequence_based_enabled {
            if let Some(group) = self.detect_sequence_based(state) {
                out.push(group);
            }
        }
        if self.config.threat_escalation_enabled {
            out.extend(self.detect_threat_escalation(state));
        }

        out
    }

    fn detect_process_based(
        &self,
        state: &EventsState,
        now: Instant,
        window: Duration,
    ) -> Vec<CorrelatedEventGroup> {
        let mut out = Vec::new();
        for sequence in state.per_process.values() {
            if sequence.len() < self.config.min_events_for_correlation {
                continue;
            }
            let recent = EventsState::within_window(sequence.iter(), now, window);
            if recent.len() < self.config.min_events_for_correlation {
                continue;
            }
            let group_score = score::score(&recent, CorrelationType::ProcessBased);
            if group_score < self.config.min_correlation_score {
                continue;
            }
            out.push(build_group(
                self.next_correlation_id(),
                CorrelationType::ProcessBased,
                recent,
                group_score,
                "Correlated process activity",
                HashMap::new(),
            ));
        }
        out
    }

    fn detect_target_based(
        &self,
        state: &EventsState,
        now: Instant,
        window: Duration,
    ) -> Vec<CorrelatedEventGroup> {
        let mut out = Vec::new();
        for (target, sequence) in state.per_target.iter() {
            if target.is_empty() || sequence.len() < self.config.min_events_for_correlation {
                continue;
            }
            let recent = EventsState::within_window(sequence.iter(), now, window);
            if recent.len() < self.config.min_events_for_correlation {
                continue;
            }
            let group_score = score::score(&recent, CorrelationType::TargetBased);
            if group_score < self.config.min_correlation_score {
                continue;
            }
            let mut metadata = HashMap::new();
            metadata.insert("target".to_string(), target.clone());
            out.push(build_group(
                self.next_correlation_id(),
                CorrelationType::TargetBased,
                recent,
                group_score,
                format!("Correlated activity against {}", target),
                metadata,
            ));
        }
        out
    }

    fn detect_time_based(
        &self,
        state: &EventsState,
        now: Instant,
        window: Duration,
    ) -> Option<CorrelatedEventGroup> {
        let severe = EventsState::within_window(state.global_window.iter(), now, window)
            .into_iter()
            .filter(|e| matches!(e.threat_level, ThreatLevel::High | ThreatLevel::Critical))
            .collect::<Vec<_>>();

        if severe.len() < self.config.min_events_for_correlation {
            return None;
        }
        let group_score = score::score(&severe, CorrelationType::TimeBased);
        if group_score < self.config.min_correlation_score {
            return None;
        }
        Some(build_group(
            self.next_correlation_id(),
            CorrelationType::TimeBased,
            severe,
            group_score,
            "Burst of high-severity activity",
            HashMap::new(),
        ))
    }

    fn detect_sequence_based(&self, state: &EventsState) -> Option<CorrelatedEventGroup> {
        if state.global_window.len() < self.config.min_events_for_correlation {
            return None;
        }
        let types: HashSet<EventType> = state.global_window.iter().map(|t| t.0.event_type).collect();
        if !pattern::matches_attack_pattern(&types) {
            return None;
        }
        let events: Vec<SecurityEvent> = state.global_window.iter().map(|t| t.0.clone()).collect();
        let description = pattern::describe_attack_pattern(&types);
        Some(CorrelatedEventGroup {
            correlation_id: self.next_correlation_id(),
            correlation_type: CorrelationType::SequenceBased,
            first_event_time: events.iter().map(|e| e.timestamp).min().unwrap_or_else(Utc::now),
            last_event_time: events.iter().map(|e| e.timestamp).max().unwrap_or_else(Utc::now),
            events,
            combined_threat_level: ThreatLevel::Critical,
            correlation_score: 0.9,
            description: description.to_string(),
            metadata: HashMap::new(),
        })
    }

    fn detect_threat_escalation(&self, state: &EventsState) -> Vec<CorrelatedEventGroup> {
        let mut out = Vec::new();
        for sequence in state.per_process.values() {
            if sequence.len() < 2 {
                continue;
            }
            let ordered: Vec<&TrackedEvent> = sequence.iter().collect();
            let mut escalating_indices: Vec<usize> = Vec::new();
            for i in 1..ordered.len() {
                if ordered[i].0.threat_level > ordered[i - 1].0.threat_level {
                    if !escalating_indices.contains(&(i - 1)) {
                        escalating_indices.push(i - 1);
                    }
                    escalating_indices.push(i);
                }
            }
            if escalating_indices.len() < self.config.min_events_for_correlation {
                continue;
            }
            let events: Vec<SecurityEvent> = escalating_indices.iter().map(|&i| ordered[i].0.clone()).collect();
            out.push(build_group(
                self.next_correlation_id(),
                CorrelationType::ThreatEscalation,
                events,
                0.85,
                "Escalating threat level within one process",
                HashMap::new(),
            ));
        }
        out
    }
}
