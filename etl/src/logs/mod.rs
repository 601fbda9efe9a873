//! Run logging.
//!
//! A [`RunLogger`] is created by the caller for one run and handed to every
//! stage that needs to report. Each entry is:
//!
//! - kept in memory so callers can read it back after the run,
//! - emitted through `tracing` (console output is configured by the binary),
//! - appended to the run's log file when one is attached,
//! - broadcast to live subscribers (the SSE endpoint) when a
//!   [`LogBroadcaster`] is attached.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    /// Stage that produced the entry (`extract`, `transform`, `load`, ...)
    pub module: String,
    pub message: String,
    pub timestamp: DateTime<Local>,
    /// Run the entry belongs to
    pub run_id: String,
}

impl LogEntry {
    /// `2024-05-01 10:00:00 - [INFO] - transform - message`
    pub fn to_line(&self) -> String {
        format!(
            "{} - [{}] - {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level.as_str(),
            self.module,
            self.message
        )
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Broadcasts log entries to all connected SSE clients
#[derive(Clone)]
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a log entry to all subscribers
    pub fn send(&self, entry: LogEntry) {
        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Run Logger
// =============================================================================

struct Sinks {
    run_id: String,
    entries: Mutex<Vec<LogEntry>>,
    file: Option<(PathBuf, Mutex<File>)>,
    /// Set on the first failed write to the log file
    file_failed: AtomicBool,
    broadcaster: Option<LogBroadcaster>,
}

/// Logger handle for a single run.
///
/// Cloning is cheap; clones share the same sinks. Use [`RunLogger::scoped`]
/// to tag entries with another module name.
#[derive(Clone)]
pub struct RunLogger {
    module: String,
    sinks: Arc<Sinks>,
}

impl RunLogger {
    /// In-memory + tracing logger.
    pub fn new(module: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            sinks: Arc::new(Sinks {
                run_id: run_id.into(),
                entries: Mutex::new(Vec::new()),
                file: None,
                file_failed: AtomicBool::new(false),
                broadcaster: None,
            }),
        }
    }

    /// Logger that also writes `log_<run_id>.log` in `log_dir`.
    pub fn with_file(
        module: impl Into<String>,
        run_id: impl Into<String>,
        log_dir: &Path,
        broadcaster: Option<LogBroadcaster>,
    ) -> std::io::Result<Self> {
        let run_id = run_id.into();
        fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("log_{}.log", run_id));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let logger = Self {
            module: module.into(),
            sinks: Arc::new(Sinks {
                run_id,
                entries: Mutex::new(Vec::new()),
                file: Some((path.clone(), Mutex::new(file))),
                file_failed: AtomicBool::new(false),
                broadcaster,
            }),
        };
        logger.debug(format!("Run log: {}", path.display()));
        Ok(logger)
    }

    /// Logger broadcasting to live subscribers, without a file.
    pub fn with_broadcaster(
        module: impl Into<String>,
        run_id: impl Into<String>,
        broadcaster: LogBroadcaster,
    ) -> Self {
        Self {
            module: module.into(),
            sinks: Arc::new(Sinks {
                run_id: run_id.into(),
                entries: Mutex::new(Vec::new()),
                file: None,
                file_failed: AtomicBool::new(false),
                broadcaster: Some(broadcaster),
            }),
        }
    }

    /// Same sinks, different module name.
    pub fn scoped(&self, module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            sinks: Arc::clone(&self.sinks),
        }
    }

    /// Run id formatted for log file names: `20240501_100000`.
    pub fn new_run_id() -> String {
        Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn run_id(&self) -> &str {
        &self.sinks.run_id
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn debug(&self, msg: impl Into<String>) {
        self.log(LogLevel::Debug, msg.into());
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.log(LogLevel::Info, msg.into());
    }

    pub fn success(&self, msg: impl Into<String>) {
        self.log(LogLevel::Success, msg.into());
    }

    pub fn warning(&self, msg: impl Into<String>) {
        self.log(LogLevel::Warning, msg.into());
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.log(LogLevel::Error, msg.into());
    }

    pub fn log(&self, level: LogLevel, message: String) {
        let entry = LogEntry {
            level,
            module: self.module.clone(),
            message,
            timestamp: Local::now(),
            run_id: self.sinks.run_id.clone(),
        };

        match level {
            LogLevel::Debug => tracing::debug!(module = %entry.module, "{}", entry.message),
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(module = %entry.module, "{}", entry.message)
            }
            LogLevel::Warning => tracing::warn!(module = %entry.module, "{}", entry.message),
            LogLevel::Error => tracing::error!(module = %entry.module, "{}", entry.message),
        }

        if let Some((path, file)) = &self.sinks.file {
            if let Ok(mut file) = file.lock() {
                if let Err(e) = writeln!(file, "{}", entry.to_line()) {
                    if !self.sinks.file_failed.swap(true, Ordering::Relaxed) {
                        tracing::warn!("Cannot write run log {}: {}", path.display(), e);
                    }
                }
            }
        }

        if let Some(broadcaster) = &self.sinks.broadcaster {
            broadcaster.send(entry.clone());
        }

        if let Ok(mut entries) = self.sinks.entries.lock() {
            entries.push(entry);
        }
    }

    /// All entries recorded so far, across scopes.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.sinks
            .entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Number of entries at the given level.
    pub fn count(&self, level: LogLevel) -> usize {
        self.sinks
            .entries
            .lock()
            .map(|entries| entries.iter().filter(|e| e.level == level).count())
            .unwrap_or(0)
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.sinks.file.as_ref().map(|(path, _)| path.as_path())
    }

    /// Whether a write to the log file has failed during this run.
    pub fn file_write_failed(&self) -> bool {
        self.sinks.file_failed.load(Ordering::Relaxed)
    }

    /// Full contents of the log file.
    pub fn contents(&self) -> String {
        match self.file_path() {
            Some(path) => fs::read_to_string(path).unwrap_or_else(|_| "Log file not found.".to_string()),
            None => "Log file not found.".to_string(),
        }
    }
}

impl std::fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogger")
            .field("module", &self.module)
            .field("run_id", &self.sinks.run_id)
            .field("file", &self.file_path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scoped_loggers_share_entries() {
        let logger = RunLogger::new("etl", "run-1");
        let transform = logger.scoped("transform");
        logger.info("start");
        transform.warning("careful");

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].module, "transform");
        assert_eq!(logger.count(LogLevel::Warning), 1);
        assert_eq!(transform.run_id(), "run-1");
    }

    #[test]
    fn test_file_sink_format() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::with_file("load", "20240501_100000", dir.path(), None).unwrap();
        logger.error("Error exporting spreadsheet: denied");

        let path = dir.path().join("log_20240501_100000.log");
        assert_eq!(logger.file_path(), Some(path.as_path()));
        let contents = logger.contents();
        assert!(contents.contains("[ERROR] - load - Error exporting spreadsheet: denied"));
    }

    #[test]
    fn test_failed_file_write_is_flagged_and_logging_continues() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log_ro.log");
        std::fs::write(&path, "").unwrap();
        // Read-only handle: every write fails
        let file = File::open(&path).unwrap();

        let logger = RunLogger {
            module: "load".to_string(),
            sinks: Arc::new(Sinks {
                run_id: "ro".to_string(),
                entries: Mutex::new(Vec::new()),
                file: Some((path.clone(), Mutex::new(file))),
                file_failed: AtomicBool::new(false),
                broadcaster: None,
            }),
        };
        assert!(!logger.file_write_failed());

        logger.info("first");
        logger.info("second");

        assert!(logger.file_write_failed());
        assert_eq!(logger.entries().len(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_contents_without_file() {
        let logger = RunLogger::new("etl", "x");
        assert_eq!(logger.contents(), "Log file not found.");
    }

    #[tokio::test]
    async fn test_broadcast_to_subscribers() {
        let broadcaster = LogBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        let logger = RunLogger::with_broadcaster("api", "r", broadcaster);
        logger.success("done");

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.level, LogLevel::Success);
        assert_eq!(entry.message, "done");
    }
}
