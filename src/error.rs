use thiserror::Error;

/// Error kinds the core recognizes. Most operational failures never reach a
/// caller as an `Err` — they become a logged event, a counter increment, or a
/// false return (see the propagation policy in the module docs). This enum
/// exists for the handful of call sites that do need to distinguish failure
/// modes (lifecycle transitions, monitor setup).
#[derive(Debug, Error)]
pub enum HipsError {
    #[error("invalid lifecycle transition: {0}")]
    InvalidLifecycleState(String),

    #[error("monitor setup failed: {0}")]
    MonitorSetupFailed(String),

    #[error("policy mismatch: {0}")]
    PolicyMismatch(String),

    #[error("protected resource missing: {0}")]
    ResourceMissing(String),

    #[error("platform API call failed: {0}")]
    ApiFault(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
