mod platform;
mod safe_call;

use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::HipsError;
use crate::event::ThreatLevel;
use crate::monitor::LifecycleState;

pub use platform::ProcessHandle;

/// Event types the self-protection engine reasons about. Distinct from
/// `event::EventType` — these describe attacks on the HIPS process itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelfProtectionEventType {
    ProcessTerminationAttempt,
    ProcessInjectionAttempt,
    FileTamperingAttempt,
    RegistryTamperingAttempt,
    ServiceStopAttempt,
    DebugAttempt,
    MemoryManipulationAttempt,
    ConfigModificationAttempt,
    DriverUnloadAttempt,
    ThreadManipulationAttempt,
    HandleManipulationAttempt,
    CriticalSectionViolation,
    KernelModeTransitionAttempt,
}

#[derive(Debug, Clone)]
pub struct SelfProtectionEvent {
    pub event_type: SelfProtectionEventType,
    pub threat_level: ThreatLevel,
    pub attacker_pid: u32,
    pub target_pid: u32,
    pub target_resource: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl SelfProtectionEvent {
    pub fn new(
        event_type: SelfProtectionEventType,
        threat_level: ThreatLevel,
        attacker_pid: u32,
        target_pid: u32,
        target_resource: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            threat_level,
            attacker_pid,
            target_pid,
            target_resource: target_resource.into(),
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfProtectionAction {
    BlockAndAlert,
    AlertOnly,
    TerminateAttacker,
}

pub type SelfProtectionCondition = Arc<dyn Fn(&SelfProtectionEvent) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct SelfProtectionRule {
    pub name: String,
    pub description: String,
    pub event_type: SelfProtectionEventType,
    pub min_threat_level: ThreatLevel,
    pub action: SelfProtectionAction,
    pub enabled: bool,
    pub custom_condition: Option<SelfProtectionCondition>,
}

impl std::fmt::Debug for SelfProtectionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfProtectionRule")
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .field("min_threat_level", &self.min_threat_level)
            .field("action", &self.action)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl SelfProtectionRule {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        event_type: SelfProtectionEventType,
        min_threat_level: ThreatLevel,
        action: SelfProtectionAction,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            event_type,
            min_threat_level,
            action,
            enabled: true,
            custom_condition: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelfProtectionConfig {
    pub protected_files: Vec<String>,
    pub protected_directories: Vec<String>,
    pub protected_registry_keys: Vec<String>,
    pub protected_processes: Vec<String>,
    pub protected_services: Vec<String>,
    pub trusted_processes: HashSet<String>,
    pub safe_mode_enabled: bool,
    pub graceful_degradation: bool,
    pub max_api_retry_attempts: u32,
    pub api_timeout_ms: u64,
    pub validate_handles: bool,
    pub check_thread_integrity: bool,
    pub monitor_critical_sections: bool,
}

impl Default for SelfProtectionConfig {
    fn default() -> Self {
        Self {
            protected_files: Vec::new(),
            protected_directories: Vec::new(),
            protected_registry_keys: Vec::new(),
            protected_processes: Vec::new(),
            protected_services: Vec::new(),
            trusted_processes: HashSet::new(),
            safe_mode_enabled: true,
            graceful_degradation: true,
            max_api_retry_attempts: 3,
            api_timeout_ms: 5000,
            validate_handles: true,
            check_thread_integrity: true,
            monitor_critical_sections: true,
        }
    }
}

const CRITICAL_PROCESS_NAMES: &[&str] = &[
    "winlogon", "csrss", "smss", "lsass", "services", "svchost", "dwm", "explorer", "wininit", "system",
];

/// Defends the HIPS process's own resources and performs sensitive
/// operations (process termination) under a never-crash discipline: every
/// OS call goes through retry + a panic barrier and failure degrades to a
/// logged safety violation rather than propagating.
pub struct SelfProtectionEngine {
    config: RwLock<SelfProtectionConfig>,
    rules: RwLock<Vec<SelfProtectionRule>>,
    state: Mutex<LifecycleState>,
    protection_event_count: AtomicU64,
    blocked_attacks_count: AtomicU64,
    current_pid: u32,
}

impl Default for SelfProtectionEngine {
    fn default() -> Self {
        Self::new(SelfProtectionConfig::default())
    }
}

impl SelfProtectionEngine {
    pub fn new(config: SelfProtectionConfig) -> Self {
        Self {
            config: RwLock::new(config),
            rules: RwLock::new(Vec::new()),
            state: Mutex::new(LifecycleState::Uninitialized),
            protection_event_count: AtomicU64::new(0),
            blocked_attacks_count: AtomicU64::new(0),
            current_pid: std::process::id(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }

    /// Seeds the six default rules and default protected resources.
    /// Idempotent: calling twice is a no-op the second time.
    pub fn initialize(&self) -> Result<(), HipsError> {
        let mut state = self.state.lock().unwrap();
        if *state != LifecycleState::Uninitialized {
            return Ok(());
        }

        self.load_default_rules();
        self.load_default_resources();

        *state = LifecycleState::Initialized;
        info!("self-protection engine initialized");
        Ok(())
    }

    /// Runs per-category setup routines. On this platform they're no-ops
    /// that always succeed — the real hooks (process/file/registry/memory/
    /// debug/service/thread/handle protection) are platform-conditional and
    /// out of scope here.
    pub fn start(&self) -> Result<(), HipsError> {
        let mut state = self.state.lock().unwrap();
        if *state == LifecycleState::Running {
            return Ok(());
        }
        if *state == LifecycleState::Uninitialized {
            return Err(HipsError::InvalidLifecycleState(
                "start() called before initialize()".into(),
            ));
        }
        *state = LifecycleState::Running;
        info!("self-protection engine started");
        Ok(())
    }

    pub fn stop(&self) -> Result<(), HipsError> {
        let mut state = self.state.lock().unwrap();
        if *state == LifecycleState::Stopped {
            return Ok(());
        }
        *state = LifecycleState::Stopped;
        info!("self-protection engine stopped");
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), HipsError> {
        {
            let current = *self.state.lock().unwrap();
            if current == LifecycleState::Running {
                self.stop()?;
            }
        }
        *self.state.lock().unwrap() = LifecycleState::Shutdown;
        info!("self-protection engine shut down");
        Ok(())
    }

    fn load_default_rules(&self) {
        use SelfProtectionAction::*;
        use SelfProtectionEventType::*;

        let defaults = [
            SelfProtectionRule::new(
                "Process Termination Protection",
                "Prevent unauthorized termination of HIPS processes",
                ProcessTerminationAttempt,
                ThreatLevel::High,
                BlockAndAlert,
            ),
            SelfProtectionRule::new(
                "Process Injection Protection",
                "Prevent code injection into HIPS processes",
                ProcessInjectionAttempt,
                ThreatLevel::Critical,
                TerminateAttacker,
            ),
            SelfProtectionRule::new(
                "File Tampering Protection",
                "Prevent unauthorized modification of HIPS files",
                FileTamperingAttempt,
                ThreatLevel::High,
                BlockAndAlert,
            ),
            SelfProtectionRule::new(
                "Registry Tampering Protection",
                "Prevent unauthorized modification of HIPS registry keys",
                RegistryTamperingAttempt,
                ThreatLevel::High,
                BlockAndAlert,
            ),
            SelfProtectionRule::new(
                "Debug Protection",
                "Prevent debugging of HIPS processes",
                DebugAttempt,
                ThreatLevel::Critical,
                TerminateAttacker,
            ),
            SelfProtectionRule::new(
                "Service Protection",
                "Prevent unauthorized stopping of HIPS services",
                ServiceStopAttempt,
                ThreatLevel::High,
                BlockAndAlert,
            ),
        ];

        let mut rules = self.rules.write().unwrap();
        rules.extend(defaults);
    }

    fn load_default_resources(&self) {
        let mut config = self.config.write().unwrap();
        config.protected_files.extend([
            "hips".to_string(),
            "hips-gui".to_string(),
            "hips_driver.ko".to_string(),
            "libhips.so".to_string(),
            "hips_config.json".to_string(),
            "protection_rules.json".to_string(),
        ]);
        config.protected_directories.extend([
            "/opt/hips".to_string(),
            "/etc/hips".to_string(),
        ]);
        config.protected_registry_keys.extend([
            "HKLM\\SYSTEM\\CurrentControlSet\\Services\\HipsDriver".to_string(),
            "HKLM\\SOFTWARE\\HIPS".to_string(),
        ]);
        config.protected_processes.extend(["hips".to_string(), "hips-gui".to_string()]);
        config.protected_services.extend(["HipsDriver".to_string(), "HipsService".to_string()]);
        config.trusted_processes.extend([
            "services".to_string(),
            "winlogon".to_string(),
            "csrss".to_string(),
        ]);
    }

    pub fn add_rule(&self, rule: SelfProtectionRule) {
        self.rules.write().unwrap().push(rule);
    }

    pub fn is_protected_resource(&self, path: &str) -> bool {
        let config = self.config.read().unwrap();
        config.protected_files.iter().any(|f| path.contains(f.as_str()))
            || config.protected_directories.iter().any(|d| path.contains(d.as_str()))
    }

    pub fn is_trusted_process(&self, name: &str) -> bool {
        self.config.read().unwrap().trusted_processes.contains(name)
    }

    // --- Defensive operations (4.H.4) -------------------------------------

    pub fn safe_open_process(&self, pid: u32) -> Option<ProcessHandle> {
        let mut result = None;
        let retries = self.config.read().unwrap().max_api_retry_attempts;
        safe_call::safe_call("safe_open_process", retries, || {
            safe_call::with_exception_barrier("safe_open_process", || {
                result = platform::open_process(pid);
                result.is_some() && self.validate_process_handle(&result.unwrap())
            })
        });
        result
    }

    pub fn validate_process_handle(&self, handle: &ProcessHandle) -> bool {
        platform::validate_handle(handle)
    }

    pub fn safe_close_handle(&self, handle: Option<ProcessHandle>) -> bool {
        match handle {
            Some(h) => platform::close_handle(h),
            None => true,
        }
    }

    pub fn check_process_is_alive(&self, pid: u32) -> bool {
        platform::process_is_alive(pid)
    }

    /// BSOD-proof (its Windows-origin term) process termination. Never
    /// terminates the current process or a process on the critical list.
    pub fn safe_terminate_process(&self, pid: u32) -> bool {
        let safe_mode = self.config.read().unwrap().safe_mode_enabled;
        if self.is_current_process(pid) {
            warn!(pid, "refused to terminate self");
            return false;
        }

        if !safe_mode {
            return platform::terminate(pid as libc::pid_t);
        }

        let retries = self.config.read().unwrap().max_api_retry_attempts;
        safe_call::safe_call("safe_terminate_process", retries, || {
            safe_call::with_exception_barrier("safe_terminate_process", || {
                if !self.check_process_is_alive(pid) {
                    return true;
                }
                if self.is_system_critical_process(pid) {
                    error!(pid, "safety violation: refused to terminate a system-critical process");
                    return false;
                }
                let handle = match self.safe_open_process(pid) {
                    Some(h) => h,
                    None => return false,
                };
                if !self.validate_process_handle(&handle) {
                    self.safe_close_handle(Some(handle));
                    return false;
                }
                let result = platform::terminate(handle.pid());
                self.safe_close_handle(Some(handle));
                result
            })
        })
    }

    fn is_current_process(&self, pid: u32) -> bool {
        pid == self.current_pid
    }

    /// Fails closed: if the process name can't be resolved, treat it as
    /// critical rather than risk terminating something essential.
    pub fn is_system_critical_process(&self, pid: u32) -> bool {
        if pid <= 4 {
            return true;
        }
        match platform::process_name(pid) {
            Some(name) => {
                let lower = name.to_lowercase();
                CRITICAL_PROCESS_NAMES.iter().any(|c| lower.contains(c))
            }
            None => true,
        }
    }

    // --- Integrity checks (4.H.5) ------------------------------------------

    pub fn check_process_integrity(&self) -> bool {
        safe_call::with_exception_barrier("check_process_integrity", platform::verify_own_signature)
    }

    /// Every protected file must exist and be readable. Returns the list of
    /// violations so the caller can raise a `FileTamperingAttempt` per
    /// missing file.
    pub fn check_file_integrity(&self) -> Vec<SelfProtectionEvent> {
        let files = self.config.read().unwrap().protected_files.clone();
        let mut violations = Vec::new();
        for file in files {
            let readable = fs::metadata(&file).map(|m| m.is_file()).unwrap_or(false);
            if !readable && std::path::Path::new(&file).is_absolute() {
                violations.push(SelfProtectionEvent::new(
                    SelfProtectionEventType::FileTamperingAttempt,
                    ThreatLevel::High,
                    0,
                    self.current_pid,
                    file.clone(),
                    "protected file missing or unreadable",
                ));
            }
        }
        violations
    }

    pub fn check_registry_integrity(&self) -> bool {
        platform::check_registry_integrity()
    }

    pub fn check_service_integrity(&self) -> bool {
        platform::check_service_integrity()
    }

    /// Lists `/proc/self/task` and treats a thread directory that vanishes
    /// mid-enumeration as evidence of manipulation. Inherently racy — a
    /// thread exiting normally between `read_dir` and the re-check looks
    /// identical to one being killed out from under us.
    pub fn check_thread_integrity(&self) -> Vec<SelfProtectionEvent> {
        if !self.config.read().unwrap().check_thread_integrity {
            return Vec::new();
        }
        let mut violations = Vec::new();
        if let Ok(entries) = fs::read_dir("/proc/self/task") {
            for entry in entries.flatten() {
                let tid = entry.file_name().to_string_lossy().to_string();
                if !entry.path().exists() {
                    violations.push(SelfProtectionEvent::new(
                        SelfProtectionEventType::ThreadManipulationAttempt,
                        ThreatLevel::High,
                        0,
                        self.current_pid,
                        tid,
                        "enumerated thread is no longer alive",
                    ));
                }
            }
        }
        violations
    }

    pub fn check_handle_integrity(&self) -> bool {
        if !self.config.read().unwrap().validate_handles {
            return true;
        }
        match platform::open_process(self.current_pid) {
            Some(handle) => self.validate_process_handle(&handle),
            None => false,
        }
    }

    /// Attempts a non-blocking acquisition of every internal lock; failure
    /// to acquire any of them signals a potential deadlock.
    pub fn check_critical_section_integrity(&self) -> bool {
        if !self.config.read().unwrap().monitor_critical_sections {
            return true;
        }
        if self.config.try_read().is_err() {
            error!("safety violation: config lock appears to be deadlocked");
            return false;
        }
        if self.rules.try_read().is_err() {
            error!("safety violation: rules lock appears to be deadlocked");
            return false;
        }
        if self.state.try_lock().is_err() {
            error!("safety violation: state lock appears to be deadlocked");
            return false;
        }
        true
    }

    // --- Event evaluation (4.H.6) -------------------------------------------

    pub fn evaluate(&self, event: &SelfProtectionEvent) -> SelfProtectionAction {
        let rules = self.rules.read().unwrap();
        for rule in rules.iter() {
            if !rule.enabled || rule.event_type != event.event_type {
                continue;
            }
            if event.threat_level < rule.min_threat_level {
                continue;
            }
            if let Some(condition) = &rule.custom_condition {
                if !condition(event) {
                    continue;
                }
            }
            return rule.action;
        }
        SelfProtectionAction::BlockAndAlert
    }

    /// Evaluates and applies an action, updating statistics. `AlertOnly`
    /// never counts as a blocked attack.
    pub fn process_event(&self, event: SelfProtectionEvent) -> SelfProtectionAction {
        self.protection_event_count.fetch_add(1, Ordering::SeqCst);
        let action = self.evaluate(&event);

        if action != SelfProtectionAction::AlertOnly {
            self.blocked_attacks_count.fetch_add(1, Ordering::SeqCst);
        }

        if action == SelfProtectionAction::TerminateAttacker
            && event.attacker_pid != 0
            && !self.is_current_process(event.attacker_pid)
        {
            self.safe_terminate_process(event.attacker_pid);
        }

        action
    }

    pub fn protection_event_count(&self) -> u64 {
        self.protection_event_count.load(Ordering::SeqCst)
    }

    pub fn blocked_attacks_count(&self) -> u64 {
        self.blocked_attacks_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SelfProtectionEngine {
        let engine = SelfProtectionEngine::default();
        engine.initialize().unwrap();
        engine
    }

    #[test]
    fn initialize_seeds_six_default_rules() {
        let engine = engine();
        assert_eq!(engine.rules.read().unwrap().len(), 6);
    }

    #[test]
    fn initialize_is_idempotent() {
        let engine = engine();
        engine.initialize().unwrap();
        assert_eq!(engine.rules.read().unwrap().len(), 6);
    }

    #[test]
    fn never_terminates_the_current_process() {
        let engine = engine();
        let pid = std::process::id();
        assert!(!engine.safe_terminate_process(pid));
        assert!(platform::process_exists(pid as libc::pid_t));
    }

    #[test]
    fn refuses_to_terminate_a_critical_pid() {
        let engine = engine();
        assert!(!engine.safe_terminate_process(1));
    }

    #[test]
    fn blocked_attacks_never_exceeds_protection_events() {
        let engine = engine();
        engine.process_event(SelfProtectionEvent::new(
            SelfProtectionEventType::DebugAttempt,
            ThreatLevel::Low,
            0,
            0,
            "",
            "",
        ));
        assert!(engine.blocked_attacks_count() <= engine.protection_event_count());
    }

    #[test]
    fn unmatched_event_defaults_to_block_and_alert() {
        let engine = SelfProtectionEngine::default();
        engine.initialize().unwrap();
        let event = SelfProtectionEvent::new(
            SelfProtectionEventType::KernelModeTransitionAttempt,
            ThreatLevel::Low,
            0,
            0,
            "",
            "",
        );
        assert_eq!(engine.evaluate(&event), SelfProtectionAction::BlockAndAlert);
    }

    #[test]
    fn critical_section_check_succeeds_when_uncontended() {
        let engine = engine();
        assert!(engine.check_critical_section_integrity());
    }
}
