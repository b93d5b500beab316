use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationConfig;
use crate::error::HipsError;
use crate::self_protection::SelfProtectionConfig;

/// Ambient configuration for one `HipsEngine`: correlation tuning,
/// self-protection toggles, and where the log sink writes. Persisted as
/// JSON under the user's config directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub log_path: Option<PathBuf>,
    #[serde(with = "correlation_config_serde")]
    pub correlation: CorrelationConfig,
    #[serde(skip, default)]
    pub self_protection: SelfProtectionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            correlation: CorrelationConfig::default(),
            self_protection: SelfProtectionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, HipsError> {
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), HipsError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// `~/.config/hipsd/config.json` (or the platform equivalent via `dirs`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hipsd").join("config.json"))
    }
}

fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("hipsd").join("hipsd.log"))
}

/// `SelfProtectionConfig` isn't (de)serializable — its protected-resource
/// lists are seeded programmatically on `initialize()`, not from disk —
/// so only `CorrelationConfig` round-trips through JSON; the field above
/// carries a manual serde adapter to keep the two numeric knobs and the
/// resource lists from fighting over one format.
mod correlation_config_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::correlation::CorrelationConfig;

    #[derive(Serialize, Deserialize)]
    struct Shadow {
        time_window_seconds: u64,
        min_events_for_correlation: usize,
        min_correlation_score: f64,
        max_events_per_process: usize,
        max_correlation_groups: usize,
        process_based_enabled: bool,
        target_based_enabled: bool,
        time_based_enabled: bool,
        sequence_based_enabled: bool,
        threat_escalation_enabled: bool,
    }

    pub fn serialize<S: Serializer>(config: &CorrelationConfig, serializer: S) -> Result<S::Ok, S::Error> {
        Shadow {
            time_window_seconds: config.time_window_seconds,
            min_events_for_correlation: config.min_events_for_correlation,
            min_correlation_score: config.min_correlation_score,
            max_events_per_process: config.max_events_per_process,
            max_correlation_groups: config.max_correlation_groups,
            process_based_enabled: config.process_based_enabled,
            target_based_enabled: config.target_based_enabled,
            time_based_enabled: config.time_based_enabled,
            sequence_based_enabled: config.sequence_based_enabled,
            threat_escalation_enabled: config.threat_escalation_enabled,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CorrelationConfig, D::Error> {
        let shadow = Shadow::deserialize(deserializer)?;
        Ok(CorrelationConfig {
            time_window_seconds: shadow.time_window_seconds,
            min_events_for_correlation: shadow.min_events_for_correlation,
            min_correlation_score: shadow.min_correlation_score,
            max_events_per_process: shadow.max_events_per_process,
            max_correlation_groups: shadow.max_correlation_groups,
            process_based_enabled: shadow.process_based_enabled,
            target_based_enabled: shadow.target_based_enabled,
            time_based_enabled: shadow.time_based_enabled,
            sequence_based_enabled: shadow.sequence_based_enabled,
            threat_escalation_enabled: shadow.threat_escalation_enabled,
        })
    }
}
