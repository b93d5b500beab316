use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::error::HipsError;
use crate::event::{EventType, SecurityEvent, ThreatLevel};

/// Lifecycle of a monitor. Transitions are one-way except `Stop` and
/// `Start`, which may alternate; `Shutdown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    Shutdown,
}

/// A source of `SecurityEvent`s. Implementors own whatever platform hooks
/// they need and feed the shared `Dispatcher` from their own thread.
///
/// Concrete platform monitors (file-system watchers, process hooks,
/// network filters, kernel driver bridges) are outside this crate's scope;
/// this trait is the seam they plug into.
pub trait Monitor: Send + Sync {
    fn initialize(&self) -> Result<(), HipsError>;
    fn start(&self) -> Result<(), HipsError>;
    fn stop(&self) -> Result<(), HipsError>;
    fn shutdown(&self) -> Result<(), HipsError>;
    fn is_initialized(&self) -> bool;
    fn is_running(&self) -> bool;
    fn state(&self) -> LifecycleState;
}

/// Applies a requested transition against the current state, rejecting
/// anything that isn't a legal move. Shared by every `Monitor` impl so the
/// rules stay in one place.
fn transition(current: LifecycleState, requested: LifecycleState) -> Result<(), HipsError> {
    use LifecycleState::*;
    let allowed = current == requested
        || matches!(
            (current, requested),
            (Uninitialized, Initialized)
                | (Initialized, Running)
                | (Running, Stopped)
                | (Stopped, Running)
                | (Initialized, Stopped)
                | (Uninitialized, Shutdown)
                | (Initialized, Shutdown)
                | (Running, Shutdown)
                | (Stopped, Shutdown)
        );
    if allowed {
        Ok(())
    } else {
        Err(HipsError::InvalidLifecycleState(format!(
            "cannot move from {:?} to {:?}",
            current, requested
        )))
    }
}

/// Demo monitor used by the binary entry point: emits a synthetic
/// heartbeat `ProcessCreation` event on a fixed interval from a background
/// thread. Stands in for a real platform monitor until one is wired in.
pub struct IntervalMonitor {
    name: String,
    interval: Duration,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<LifecycleState>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalMonitor {
    pub fn new(name: impl Into<String>, interval: Duration, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            name: name.into(),
            interval,
            dispatcher,
            state: Mutex::new(LifecycleState::Uninitialized),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    fn set_state(&self, next: LifecycleState) -> Result<(), HipsError> {
        let mut state = self.state.lock().unwrap();
        transition(*state, next)?;
        *state = next;
        Ok(())
    }
}

impl Monitor for IntervalMonitor {
    fn initialize(&self) -> Result<(), HipsError> {
        if *self.state.lock().unwrap() != LifecycleState::Uninitialized {
            return Ok(());
        }
        self.set_state(LifecycleState::Initialized)?;
        info!(monitor = %self.name, "monitor initialized");
        Ok(())
    }

    fn start(&self) -> Result<(), HipsError> {
        if *self.state.lock().unwrap() == LifecycleState::Running {
            return Ok(());
        }
        self.set_state(LifecycleState::Running)?;
        self.running.store(true, Ordering::SeqCst);

        let dispatcher = self.dispatcher.clone();
        let running = self.running.clone();
        let interval = self.interval;
        let name = self.name.clone();

        let handle = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                thread::sleep(interval);
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let event = SecurityEvent::new(
                    EventType::ProcessCreation,
                    ThreatLevel::Low,
                    std::process::id(),
                    0,
                    SecurityEvent::unknown_process_path(),
                    "",
                    format!("heartbeat from {}", name),
                );
                dispatcher.dispatch(event);
                debug!(monitor = %name, "heartbeat dispatched");
            }
        });

        *self.worker.lock().unwrap() = Some(handle);
        info!(monitor = %self.name, "monitor started");
        Ok(())
    }

    fn stop(&self) -> Result<(), HipsError> {
        self.set_state(LifecycleState::Stopped)?;
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!(monitor = %self.name, "monitor stopped");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), HipsError> {
        if self.is_running() {
            self.stop()?;
        }
        self.set_state(LifecycleState::Shutdown)?;
        info!(monitor = %self.name, "monitor shut down");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        !matches!(*self.state.lock().unwrap(), LifecycleState::Uninitialized)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSink;
    use crate::rules::RuleStore;
    use crate::stats::StatisticsRegistry;

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            Arc::new(RuleStore::new()),
            Arc::new(StatisticsRegistry::new()),
            Arc::new(AlertSink::new()),
        ))
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let monitor = IntervalMonitor::new("test", Duration::from_millis(10), dispatcher());
        assert!(monitor.start().is_err());
    }

    #[test]
    fn start_stop_shutdown_is_idempotent_in_state() {
        let monitor = IntervalMonitor::new("test", Duration::from_millis(5), dispatcher());
        monitor.initialize().unwrap();
        monitor.start().unwrap();
        assert!(monitor.is_running());
        monitor.stop().unwrap();
        assert!(!monitor.is_running());
        monitor.shutdown().unwrap();
        assert_eq!(monitor.state(), LifecycleState::Shutdown);
    }
}
