//! Run history - one JSON record per ETL run
//!
//! Records are stored as `<id>.json` in the runs directory and loaded on
//! construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, RegistryResult};
use crate::transform::StepOutcome;

/// Directory where runs are stored (relative to current dir)
pub const DEFAULT_RUNS_DIR: &str = ".listings-etl/runs";

/// Kind of load target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Relational,
    Spreadsheet,
}

/// Outcome of writing one load target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTarget {
    pub kind: TargetKind,
    pub path: String,
    /// Rows written, when the write succeeded
    pub rows: Option<usize>,
    pub error: Option<String>,
}

/// A finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Unique identifier
    pub id: String,
    /// Run id shared with the log file
    pub run_id: String,
    pub collection: String,
    /// Where the documents came from
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub extracted_rows: usize,
    pub final_rows: usize,
    pub final_columns: usize,
    /// One line per executed transform step
    pub report: Vec<String>,
    pub steps: Vec<StepOutcome>,
    pub warnings: usize,
    pub errors: usize,
    pub targets: Vec<LoadTarget>,
    /// Relational row count matched; `None` when not verified
    pub verified: Option<bool>,
    pub log_file: Option<String>,
}

impl RunRecord {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// One-line description for listings
    pub fn headline(&self) -> String {
        let status = if self.errors > 0 {
            "errors"
        } else if self.warnings > 0 {
            "warnings"
        } else {
            "ok"
        };
        format!(
            "{}  {}  {}  {} -> {} rows  [{}]",
            self.id,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.collection,
            self.extracted_rows,
            self.final_rows,
            status
        )
    }
}

/// Registry of finished runs
pub struct RunRegistry {
    /// Directory where runs are stored
    runs_dir: PathBuf,
    /// Loaded runs (id -> record)
    runs: HashMap<String, RunRecord>,
}

impl RunRegistry {
    /// Open the default registry
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_RUNS_DIR)
    }

    /// Open a registry in a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            runs_dir: PathBuf::from(dir.as_ref()),
            runs: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    /// Load every readable record; unreadable files are skipped
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.runs_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(record) = serde_json::from_str::<RunRecord>(&content) {
                        self.runs.insert(record.id.clone(), record);
                    }
                }
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.runs_dir
    }

    /// All runs, most recent first
    pub fn list(&self) -> Vec<&RunRecord> {
        let mut runs: Vec<&RunRecord> = self.runs.values().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    /// Get a run by ID
    pub fn get(&self, id: &str) -> Option<&RunRecord> {
        self.runs.get(id)
    }

    /// Persist a run, replacing any record with the same ID
    pub fn save(&mut self, record: RunRecord) -> RegistryResult<()> {
        fs::create_dir_all(&self.runs_dir)?;

        let path = self.runs_dir.join(format!("{}.json", record.id));
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;

        self.runs.insert(record.id.clone(), record);
        Ok(())
    }

    /// Delete a run
    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        if self.runs.remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        fs::remove_file(self.runs_dir.join(format!("{}.json", id)))?;
        Ok(())
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn record(id: &str, started_at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            id: id.to_string(),
            run_id: "20240501_100000".to_string(),
            collection: "listado".to_string(),
            source: "directory data".to_string(),
            started_at,
            finished_at: started_at + Duration::milliseconds(250),
            extracted_rows: 10,
            final_rows: 9,
            final_columns: 12,
            report: vec!["Cleanup: 10 => 9 (1 removed)".to_string()],
            steps: Vec::new(),
            warnings: 1,
            errors: 0,
            targets: vec![LoadTarget {
                kind: TargetKind::Relational,
                path: "listado.db".to_string(),
                rows: Some(9),
                error: None,
            }],
            verified: Some(true),
            log_file: None,
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let mut registry = RunRegistry::with_dir(dir.path());
        registry.save(record("a", Utc::now())).unwrap();

        let reloaded = RunRegistry::with_dir(dir.path());
        let run = reloaded.get("a").unwrap();
        assert_eq!(run.final_rows, 9);
        assert_eq!(run.targets[0].kind, TargetKind::Relational);
        assert_eq!(run.duration_ms(), 250);
    }

    #[test]
    fn test_list_most_recent_first() {
        let dir = tempdir().unwrap();
        let mut registry = RunRegistry::with_dir(dir.path());
        let now = Utc::now();
        registry.save(record("old", now - Duration::hours(1))).unwrap();
        registry.save(record("new", now)).unwrap();

        let ids: Vec<&str> = registry.list().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let mut registry = RunRegistry::with_dir(dir.path());
        registry.save(record("a", Utc::now())).unwrap();

        registry.delete("a").unwrap();
        assert!(registry.get("a").is_none());
        assert!(!dir.path().join("a.json").exists());
        assert!(matches!(registry.delete("a"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let registry = RunRegistry::with_dir(dir.path().join("nope"));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_headline() {
        let run = record("a", Utc::now());
        assert!(run.headline().contains("10 -> 9 rows"));
        assert!(run.headline().ends_with("[warnings]"));
    }
}
