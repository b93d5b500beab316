use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::{info, warn};

use crate::alert::AlertSink;
use crate::config::EngineConfig;
use crate::correlation::CorrelationEngine;
use crate::dispatcher::Dispatcher;
use crate::error::HipsError;
use crate::event::{EventType, SecurityEvent};
use crate::logging::{LogLevel, LogSink};
use crate::monitor::{LifecycleState, Monitor};
use crate::rules::RuleStore;
use crate::self_protection::SelfProtectionEngine;
use crate::stats::StatisticsRegistry;

const ALL_EVENT_TYPES: [EventType; 9] = [
    EventType::FileAccess,
    EventType::FileModification,
    EventType::FileDeletion,
    EventType::ProcessCreation,
    EventType::ProcessTermination,
    EventType::NetworkConnection,
    EventType::RegistryModification,
    EventType::MemoryInjection,
    EventType::ExploitAttempt,
];

/// The top-level object: wires the rule store, dispatcher, correlation
/// engine, self-protection engine, and whatever monitors the host
/// registers into one lifecycle. Owns every monitor exclusively — monitors
/// must not outlive the engine.
pub struct HipsEngine {
    pub rules: Arc<RuleStore>,
    pub stats: Arc<StatisticsRegistry>,
    pub alerts: Arc<AlertSink>,
    pub log: Arc<LogSink>,
    pub dispatcher: Arc<Dispatcher>,
    pub correlation: Arc<CorrelationEngine>,
    pub self_protection: Arc<SelfProtectionEngine>,
    monitors: Mutex<Vec<Box<dyn Monitor>>>,
    state: Mutex<LifecycleState>,
}

impl HipsEngine {
    pub fn new(config: EngineConfig) -> Self {
        let rules = Arc::new(RuleStore::new());
        let stats = Arc::new(StatisticsRegistry::new());
        let alerts = Arc::new(AlertSink::new());
        let log = Arc::new(LogSink::new(config.log_path.clone()));
        let dispatcher = Arc::new(Dispatcher::new(rules.clone(), stats.clone(), alerts.clone()));
        let correlation = Arc::new(CorrelationEngine::new(config.correlation.clone()));
        let self_protection = Arc::new(SelfProtectionEngine::new(config.self_protection.clone()));

        Self {
            rules,
            stats,
            alerts,
            log,
            dispatcher,
            correlation,
            self_protection,
            monitors: Mutex::new(Vec::new()),
            state: Mutex::new(LifecycleState::Uninitialized),
        }
    }

    pub fn register_monitor(&self, monitor: Box<dyn Monitor>) {
        self.monitors.lock().unwrap().push(monitor);
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }

    /// Seeds default rules, wires the correlation engine behind every
    /// dispatcher event type, and initializes self-protection. Idempotent.
    pub fn initialize(&self) -> Result<(), HipsError> {
        let mut state = self.state.lock().unwrap();
        if *state != LifecycleState::Uninitialized {
            return Ok(());
        }

        self.rules.load_defaults();

        let correlation = self.correlation.clone();
        let log = self.log.clone();
        correlation.set_callback(move |group| {
            log.log(
                LogLevel::Warn,
                format!(
                    "correlation {} ({:?}): {} events, score {:.2} — {}",
                    group.correlation_id,
                    group.correlation_type,
                    group.events.len(),
                    group.correlation_score,
                    group.description
                ),
            );
        });

        for event_type in ALL_EVENT_TYPES {
            let correlation = self.correlation.clone();
            self.dispatcher.register_handler(event_type, move |event: &SecurityEvent| {
                correlation.process(event.clone());
            });
        }

        self.self_protection.initialize()?;

        *state = LifecycleState::Initialized;
        info!("HIPS engine initialized");
        Ok(())
    }

    /// Starts self-protection and every registered monitor. A monitor that
    /// fails to start logs the sub-failure and is skipped; engine start
    /// otherwise proceeds per the error-handling design.
    pub fn start(&self) -> Result<(), HipsError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == LifecycleState::Running {
                return Ok(());
            }
            if *state == LifecycleState::Uninitialized {
                return Err(HipsError::InvalidLifecycleState("start() called before initialize()".into()));
            }
            *state = LifecycleState::Running;
        }

        self.self_protection.start()?;

        for monitor in self.monitors.lock().unwrap().iter() {
            if let Err(err) = monitor.initialize().and_then(|_| monitor.start()) {
                warn!(error = %err, "monitor failed to start, continuing without it");
            }
        }

        info!("HIPS engine started");
        Ok(())
    }

    pub fn stop(&self) -> Result<(), HipsError> {
        let mut state = self.state.lock().unwrap();
        if *state == LifecycleState::Stopped {
            return Ok(());
        }
        for monitor in self.monitors.lock().unwrap().iter() {
            let _ = monitor.stop();
        }
        let _ = self.self_protection.stop();
        *state = LifecycleState::Stopped;
        info!("HIPS engine stopped");
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), HipsError> {
        {
            let current = *self.state.lock().unwrap();
            if current == LifecycleState::Running {
                self.stop()?;
            }
        }
        for monitor in self.monitors.lock().unwrap().iter() {
            let _ = monitor.shutdown();
        }
        let _ = self.self_protection.shutdown();
        *self.state.lock().unwrap() = LifecycleState::Shutdown;
        info!("HIPS engine shut down");
        Ok(())
    }
}

static GLOBAL_ENGINE: RwLock<Option<Weak<HipsEngine>>> = RwLock::new(None);

/// Registers the process-wide weak reference a `ctrlc` handler uses to call
/// `stop()` without owning the engine. Replaces the source's raw global
/// singleton pointer with well-defined init/teardown order: the slot holds
/// a `Weak`, so a dropped engine simply makes `global_handle()` return
/// `None` instead of dangling.
pub fn set_global_handle(engine: Weak<HipsEngine>) {
    *GLOBAL_ENGINE.write().unwrap() = Some(engine);
}

pub fn global_handle() -> Option<Arc<HipsEngine>> {
    GLOBAL_ENGINE.read().unwrap().as_ref().and_then(Weak::upgrade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_seeds_default_rules_and_wires_correlation() {
        let engine = HipsEngine::new(EngineConfig::default());
        engine.initialize().unwrap();
        assert_eq!(engine.rules.list().len(), 2);

        engine.dispatcher.dispatch(SecurityEvent::new(
            EventType::ProcessCreation,
            crate::event::ThreatLevel::Low,
            1,
            1,
            "",
            "",
            "",
        ));
        assert_eq!(engine.correlation.processed_event_count(), 1);
    }

    #[test]
    fn lifecycle_transitions_are_idempotent() {
        let engine = HipsEngine::new(EngineConfig::default());
        engine.initialize().unwrap();
        engine.initialize().unwrap();
        engine.start().unwrap();
        engine.start().unwrap();
        engine.stop().unwrap();
        engine.stop().unwrap();
        engine.shutdown().unwrap();
        assert_eq!(engine.state(), LifecycleState::Shutdown);
    }
}
