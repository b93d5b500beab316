use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::alert::AlertSink;
use crate::event::{EventType, SecurityEvent};
use crate::policy::PolicyEvaluator;
use crate::rules::{ActionKind, RuleStore};
use crate::stats::StatisticsRegistry;

type EventHandler = Box<dyn Fn(&SecurityEvent) + Send + Sync>;

/// Central pipeline every monitor feeds events into. `dispatch` is the one
/// entry point: count it, log it, evaluate policy against it, act on the
/// verdict, then hand it to whatever per-type callback was registered last.
pub struct Dispatcher {
    rules: Arc<RuleStore>,
    stats: Arc<StatisticsRegistry>,
    evaluator: PolicyEvaluator,
    alerts: Arc<AlertSink>,
    handlers: Mutex<HashMap<EventType, EventHandler>>,
}

impl Dispatcher {
    pub fn new(rules: Arc<RuleStore>, stats: Arc<StatisticsRegistry>, alerts: Arc<AlertSink>) -> Self {
        let evaluator = PolicyEvaluator::new(rules.clone());
        Self {
            rules,
            stats,
            evaluator,
            alerts,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a callback for one event type. A later call for the same
    /// type replaces the earlier one outright.
    pub fn register_handler(
        &self,
        event_type: EventType,
        handler: impl Fn(&SecurityEvent) + Send + Sync + 'static,
    ) {
        self.handlers.lock().unwrap().insert(event_type, Box::new(handler));
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn dispatch(&self, event: SecurityEvent) {
        self.stats.increment(event.event_type);

        info!(
            event_type = ?event.event_type,
            threat_level = ?event.threat_level,
            process_path = %event.process_path,
            target = %event.target_path,
            "security event observed"
        );

        let action = self.evaluator.evaluate(&event);
        match action {
            ActionKind::Allow => {}
            ActionKind::Custom => {}
            ActionKind::AlertOnly | ActionKind::Deny | ActionKind::Quarantine => {
                self.alerts.raise(event.clone(), format!("{:?} applied", action));
            }
        }

        let handlers = self.handlers.lock().unwrap();
        if let Some(handler) = handlers.get(&event.event_type) {
            handler(&event);
        }
    }
}
