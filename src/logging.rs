use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;

/// Severity of a line written through `LogSink`. Distinct from
/// `event::ThreatLevel` — this is a logging concept, not a security one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

/// Leveled, line-oriented log that writes to an optional file and always
/// echoes to stderr via `tracing`. Lines look like
/// `YYYY-MM-DD HH:MM:SS [LEVEL] message`.
pub struct LogSink {
    file_path: Option<PathBuf>,
    lines: Mutex<Vec<String>>,
}

impl LogSink {
    pub fn new(file_path: Option<PathBuf>) -> Self {
        Self {
            file_path,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let line = format!(
            "{} [{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            level.label(),
            message.as_ref()
        );

        match level {
            LogLevel::Debug => tracing::debug!("{}", message.as_ref()),
            LogLevel::Info => tracing::info!("{}", message.as_ref()),
            LogLevel::Warn => tracing::warn!("{}", message.as_ref()),
            LogLevel::Error => tracing::error!("{}", message.as_ref()),
            LogLevel::Critical => tracing::error!(critical = true, "{}", message.as_ref()),
        }

        if let Some(path) = &self.file_path {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{}", line);
            }
        }

        self.lines.lock().unwrap().push(line);
    }

    /// Lines written this session, for tests and diagnostics. Does not
    /// re-read the backing file.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_the_requested_level() {
        let sink = LogSink::new(None);
        sink.log(LogLevel::Warn, "disk almost full");
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[WARN]"));
        assert!(lines[0].contains("disk almost full"));
    }

    #[test]
    fn critical_is_a_distinct_level_above_error() {
        let sink = LogSink::new(None);
        sink.log(LogLevel::Critical, "self-protection compromised");
        let lines = sink.lines();
        assert!(lines[0].contains("[CRITICAL]"));
    }
}
