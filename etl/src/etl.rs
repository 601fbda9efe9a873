//! End-to-end run: extract, transform, load, record.
//!
//! Only extraction failures (including structurally invalid documents) and
//! run-history failures end a run with an error. Transform step failures are
//! handled inside the pipeline; a failed load target is logged and the
//! remaining targets are still written.

use chrono::Utc;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::EtlConfig;
use crate::error::EtlResult;
use crate::extract::Extractor;
use crate::load::Loader;
use crate::logs::{LogLevel, RunLogger};
use crate::models::Dataset;
use crate::runs::{LoadTarget, RunRecord, RunRegistry, TargetKind};
use crate::transform::TransformPipeline;

/// Collection extracted when none is given
pub const DEFAULT_COLLECTION: &str = "listado";

/// What to extract and where to load it
#[derive(Debug, Clone)]
pub struct EtlOptions {
    pub collection: String,
    /// SQLite database; `None` skips the relational target
    pub relational_path: Option<PathBuf>,
    /// Table name, defaults to the collection name
    pub table: String,
    /// xlsx workbook; `None` skips the spreadsheet target
    pub spreadsheet_path: Option<PathBuf>,
    /// Check the relational row count after loading
    pub verify: bool,
    /// Run history directory; `None` does not record the run
    pub runs_dir: Option<PathBuf>,
}

impl EtlOptions {
    /// Both targets under the configured output directory, named after the
    /// collection.
    pub fn from_config(config: &EtlConfig, collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            relational_path: Some(config.relational_path(collection)),
            table: collection.to_string(),
            spreadsheet_path: Some(config.spreadsheet_path(collection)),
            verify: true,
            runs_dir: Some(config.runs_dir.clone()),
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct EtlSummary {
    pub record: RunRecord,
    pub dataset: Dataset,
}

/// Run the whole ETL for one collection.
pub async fn run_etl<E: Extractor>(
    extractor: &E,
    loader: &mut Loader,
    options: &EtlOptions,
    logger: &RunLogger,
) -> EtlResult<EtlSummary> {
    let started_at = Utc::now();
    let extract_log = logger.scoped("extract");
    let load_log = logger.scoped("load");

    // Extract
    extract_log.info(format!(
        "Extracting '{}' from {}",
        options.collection,
        extractor.describe()
    ));
    let dataset = match extractor.fetch(&options.collection).await {
        Ok(dataset) => dataset,
        Err(e) => {
            extract_log.error(format!("Error extracting '{}': {}", options.collection, e));
            return Err(e.into());
        }
    };
    let extracted_rows = dataset.len();
    extract_log.success(format!(
        "Extracted {} rows, {} columns from '{}'",
        extracted_rows,
        dataset.columns().len(),
        options.collection
    ));

    // Transform
    let mut pipeline = TransformPipeline::new(dataset, logger);
    pipeline.run();

    // Load
    load_log.info(format!("Loading {} rows", pipeline.dataset().len()));
    let mut targets = Vec::new();
    let mut verified = None;
    let reports_before = loader.reports().len();

    if let Some(ref store) = options.relational_path {
        let result = loader.persist_relational(pipeline.dataset(), store, &options.table);
        if let Err(ref e) = result {
            load_log.error(format!("Error loading into SQLite: {}", e));
        }
        let loaded = result.is_ok();
        targets.push(target(TargetKind::Relational, store, result));

        if loaded && options.verify {
            let expected = pipeline.dataset().len();
            match loader.verify_relational(store, &options.table, expected) {
                Ok(true) => {
                    load_log.success(format!("Verification passed: {} rows in '{}'", expected, options.table));
                    verified = Some(true);
                }
                Ok(false) => {
                    load_log.warning(format!(
                        "Row count mismatch: '{}' does not hold {} rows",
                        options.table, expected
                    ));
                    verified = Some(false);
                }
                Err(e) => load_log.error(format!("Error verifying SQLite load: {}", e)),
            }
        }
    }

    if let Some(ref file) = options.spreadsheet_path {
        let result = loader.persist_spreadsheet(pipeline.dataset(), file);
        if let Err(ref e) = result {
            load_log.error(format!("Error writing spreadsheet: {}", e));
        }
        targets.push(target(TargetKind::Spreadsheet, file, result));
    }

    for line in &loader.reports()[reports_before..] {
        load_log.info(line.clone());
    }

    // Record
    let record = RunRecord {
        id: Uuid::new_v4().to_string(),
        run_id: logger.run_id().to_string(),
        collection: options.collection.clone(),
        source: extractor.describe(),
        started_at,
        finished_at: Utc::now(),
        extracted_rows,
        final_rows: pipeline.dataset().len(),
        final_columns: pipeline.dataset().columns().len(),
        report: pipeline.report().lines().to_vec(),
        steps: pipeline.outcomes().to_vec(),
        warnings: logger.count(LogLevel::Warning),
        errors: logger.count(LogLevel::Error),
        targets,
        verified,
        log_file: logger.file_path().map(|p| p.display().to_string()),
    };

    if let Some(ref dir) = options.runs_dir {
        RunRegistry::with_dir(dir).save(record.clone())?;
        logger.debug(format!("Run recorded as {}", record.id));
    }

    Ok(EtlSummary {
        record,
        dataset: pipeline.into_dataset(),
    })
}

fn target<E: std::fmt::Display>(kind: TargetKind, path: &std::path::Path, result: Result<usize, E>) -> LoadTarget {
    let (rows, error) = match result {
        Ok(rows) => (Some(rows), None),
        Err(e) => (None, Some(e.to_string())),
    };
    LoadTarget {
        kind,
        path: path.display().to_string(),
        rows,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::extract::DocumentDir;
    use crate::load::count_rows;
    use tempfile::tempdir;

    const LISTINGS: &str = r#"[
        {"_id": {"$oid": "a1"}, "name": "Loft", "price": "$1,200.00", "first_review_date": {"$date": "2019-02-16T05:00:00.000Z"}, "amenities": "{\"Wifi\",\"Kitchen\"}"},
        {"_id": {"$oid": "a2"}, "name": "Cabin", "price": "$85.00", "first_review_date": {"$date": "2018-11-03T05:00:00.000Z"}, "amenities": "{\"Wifi\"}"},
        {"_id": {"$oid": "a3"}, "name": "Studio", "price": "$150.00", "first_review_date": null, "amenities": "{\"TV\"}"},
        {"_id": {"$oid": "a4"}, "name": "Villa", "price": "$400.00", "first_review_date": {"$date": "2020-07-01T05:00:00.000Z"}, "amenities": "{}"},
        {"_id": {"$oid": "a5"}, "name": "Room", "price": "$60.00", "first_review_date": {"$date": "2021-12-24T05:00:00.000Z"}, "amenities": "{\"Heating\"}"}
    ]"#;

    fn options(root: &std::path::Path) -> EtlOptions {
        EtlOptions {
            collection: "listado".to_string(),
            relational_path: Some(root.join("out").join("listado.db")),
            table: "listado".to_string(),
            spreadsheet_path: Some(root.join("out").join("listado.xlsx")),
            verify: true,
            runs_dir: Some(root.join("runs")),
        }
    }

    #[tokio::test]
    async fn test_full_run() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("listado.json"), LISTINGS).unwrap();
        let logger = RunLogger::new("etl", "test");
        let mut loader = Loader::new();

        let summary = run_etl(&DocumentDir::new(dir.path()), &mut loader, &options(dir.path()), &logger)
            .await
            .unwrap();

        assert_eq!(summary.record.extracted_rows, 5);
        assert_eq!(summary.record.final_rows, 5);
        assert_eq!(summary.record.report.len(), 6);
        assert_eq!(summary.record.verified, Some(true));
        assert_eq!(summary.record.errors, 0);
        assert!(summary.record.targets.iter().all(|t| t.rows == Some(5)));

        assert_eq!(count_rows(&dir.path().join("out/listado.db"), "listado").unwrap(), 5);
        assert!(dir.path().join("out/listado.xlsx").exists());

        let registry = RunRegistry::with_dir(dir.path().join("runs"));
        assert!(registry.get(&summary.record.id).is_some());
        assert!(summary.dataset.has_column("first_review_date_year"));
    }

    #[tokio::test]
    async fn test_extract_failure_ends_run() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::new("etl", "test");

        let err = run_etl(&DocumentDir::new(dir.path()), &mut Loader::new(), &options(dir.path()), &logger)
            .await
            .unwrap_err();

        assert!(matches!(err, EtlError::Extract(_)));
        assert_eq!(logger.count(LogLevel::Error), 1);
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_failed_target_does_not_stop_the_other() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("listado.json"), LISTINGS).unwrap();
        let logger = RunLogger::new("etl", "test");

        let mut options = options(dir.path());
        // A directory cannot be opened as a database
        options.relational_path = Some(dir.path().to_path_buf());
        options.runs_dir = None;

        let summary = run_etl(&DocumentDir::new(dir.path()), &mut Loader::new(), &options, &logger)
            .await
            .unwrap();

        assert!(summary.record.targets[0].error.is_some());
        assert_eq!(summary.record.targets[1].rows, Some(5));
        assert_eq!(summary.record.verified, None);
        assert!(summary.record.errors >= 1);
    }

    #[tokio::test]
    async fn test_reused_loader_logs_only_its_own_loads() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("listado.json"), LISTINGS).unwrap();
        let source = DocumentDir::new(dir.path());
        let mut loader = Loader::new();

        let first = RunLogger::new("etl", "first");
        run_etl(&source, &mut loader, &options(dir.path()), &first).await.unwrap();
        let second = RunLogger::new("etl", "second");
        run_etl(&source, &mut loader, &options(dir.path()), &second).await.unwrap();

        let load_lines = |logger: &RunLogger| {
            logger
                .entries()
                .into_iter()
                .filter(|e| e.module == "load" && e.level == LogLevel::Info && !e.message.starts_with("Loading"))
                .count()
        };
        assert_eq!(load_lines(&first), 2);
        assert_eq!(load_lines(&second), 2);
        assert_eq!(loader.reports().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_collection_loads_nothing_but_succeeds() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("listado.json"), "[]").unwrap();
        let logger = RunLogger::new("etl", "test");

        let summary = run_etl(&DocumentDir::new(dir.path()), &mut Loader::new(), &options(dir.path()), &logger)
            .await
            .unwrap();

        assert_eq!(summary.record.final_rows, 0);
        // No columns: the relational target is reported as failed
        assert!(summary.record.targets[0].error.is_some());
    }
}
