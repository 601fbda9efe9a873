//! # listings-etl - batch ETL for short-term-rental listings
//!
//! Extracts a listings collection from a document store, cleans and enriches
//! it in memory, and loads the result into SQLite and an Excel workbook.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Document   │────▶│   Extract   │────▶│  Transform  │────▶│    Load     │
//! │    store    │     │  (Dataset)  │     │  (6 steps)  │     │SQLite, xlsx │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use listings_etl::{run_etl, DocumentDir, EtlConfig, EtlOptions, Loader, RunLogger};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = EtlConfig::from_env().unwrap();
//!     let logger = RunLogger::with_file("etl", RunLogger::new_run_id(), &config.log_dir, None).unwrap();
//!     let options = EtlOptions::from_config(&config, "listado");
//!     let summary = run_etl(&DocumentDir::new("data"), &mut Loader::new(), &options, &logger)
//!         .await
//!         .unwrap();
//!     println!("{} rows loaded", summary.record.final_rows);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells, rows and the in-memory dataset
//! - [`logs`] - Per-run logger
//! - [`config`] - Environment configuration
//! - [`parser`] - CSV parsing with auto-detection
//! - [`extract`] - Document stores
//! - [`transform`] - Steps and pipeline
//! - [`load`] - SQLite and spreadsheet targets
//! - [`runs`] - Run history
//! - [`etl`] - End-to-end runs
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod logs;
pub mod models;

// Configuration
pub mod config;

// Extraction
pub mod extract;
pub mod parser;

// Transformation
pub mod transform;

// Loading
pub mod load;

// Orchestration
pub mod etl;
pub mod runs;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, DatasetError, EtlError, ExtractError, LoadError, RegistryError, ServerError, StepError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Cell, Dataset, PriceCategory, Row};

// =============================================================================
// Re-exports - Logging and configuration
// =============================================================================

pub use config::{DataApiSettings, EtlConfig};
pub use logs::{LogBroadcaster, LogEntry, LogLevel, RunLogger};

// =============================================================================
// Re-exports - Extraction
// =============================================================================

pub use extract::{parse_json_documents, parse_json_lines, DataApiClient, DocumentDir, Extractor, Source};
pub use parser::{detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto, parse_str, ParseResult};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{steps_description, Report, Step, StepOutcome, StepStatus, TransformPipeline};

// =============================================================================
// Re-exports - Loading and runs
// =============================================================================

pub use etl::{run_etl, EtlOptions, EtlSummary, DEFAULT_COLLECTION};
pub use load::{count_rows, Loader};
pub use runs::{LoadTarget, RunRecord, RunRegistry, TargetKind};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
