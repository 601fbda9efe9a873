//! Error types for the listings ETL.
//!
//! One enum per layer:
//!
//! - [`DatasetError`] - structurally invalid input (the only fatal transform error)
//! - [`StepError`] - failures inside a single transform step
//! - [`ExtractError`] - document store errors
//! - [`LoadError`] - relational / spreadsheet target errors
//! - [`RegistryError`] - run history errors
//! - [`ConfigError`] - environment configuration errors
//! - [`EtlError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

pub use crate::parser::CsvError;

// =============================================================================
// Dataset Errors
// =============================================================================

/// The input is not a valid tabular structure.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A source document is not a key/value object.
    #[error("Document {index} is not an object (found {found})")]
    NotAnObject { index: usize, found: String },

    /// A column was written with the wrong number of values.
    #[error("Column '{column}' has {actual} values, dataset has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

// =============================================================================
// Step Errors
// =============================================================================

/// Failures raised inside a transform step.
///
/// These never escape the pipeline: the step boundary turns them into a
/// warning or error on the run log.
#[derive(Debug, Error)]
pub enum StepError {
    /// A price cell holds a value that has no textual form.
    #[error("Unsupported price value in row {row}: {value}")]
    UnsupportedPrice { row: usize, value: String },

    /// There are no numeric prices to bin.
    #[error("No numeric price values to categorize")]
    NoPrices,

    /// A non-null price is not numeric (price not normalized yet?).
    #[error("Price in row {row} is not numeric: {value}")]
    NonNumericPrice { row: usize, value: String },

    /// Quartile edges collapse on degenerate distributions.
    #[error("Bin edges must be unique: {edges:?}")]
    DuplicateBinEdges { edges: Vec<f64> },

    /// An amenity flag would overwrite an existing non-flag column.
    #[error("Column '{column}' already exists and is not an amenity flag")]
    AmenityColumnConflict { column: String },

    /// Underlying dataset error.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

// =============================================================================
// Extraction Errors
// =============================================================================

/// Errors from a document store.
///
/// An empty collection is not an error; it yields an empty dataset.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// A required setting is missing.
    #[error("Missing setting: {0}")]
    MissingSetting(String),

    /// Failed to read a collection file.
    #[error("Failed to read collection: {0}")]
    Io(#[from] std::io::Error),

    /// Collection file or response is not valid JSON.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// Collection CSV could not be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The store answered with an error.
    #[error("API error: {0}")]
    ApiError(String),

    /// Documents do not form a dataset.
    #[error("Invalid documents: {0}")]
    Dataset(#[from] DatasetError),
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors while persisting the final dataset.
#[derive(Debug, Error)]
pub enum LoadError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Spreadsheet writer error.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    /// IO error.
    #[error("Load IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Table name cannot be used as an identifier.
    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),

    /// Dataset does not fit the spreadsheet's row or column limits.
    #[error("Dataset too large for a spreadsheet: {0}")]
    TooLarge(usize),

    /// A table needs at least one column.
    #[error("Dataset has no columns to load into '{0}'")]
    NoColumns(String),
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the run history.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Run not found.
    #[error("Run not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Variable is set but empty or malformed.
    #[error("Invalid value for {name}: {message}")]
    Invalid { name: String, message: String },

    /// Variable required by another one is missing.
    #[error("{name} is required when {because} is set")]
    Missing { name: String, because: String },
}

// =============================================================================
// ETL Errors (top-level)
// =============================================================================

/// Top-level orchestration errors.
///
/// This is the error type returned by [`crate::etl::run_etl`]. Step and
/// load failures are logged instead; only extraction, invalid input and
/// bookkeeping failures end a run early.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Extraction error.
    #[error("Extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Invalid input dataset.
    #[error("Invalid dataset: {0}")]
    Dataset(#[from] DatasetError),

    /// Load error.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// ETL error.
    #[error("ETL error: {0}")]
    Etl(#[from] EtlError),

    /// Failed to bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for dataset construction.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Result type inside transform steps.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for extraction.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type for loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for ETL runs.
pub type EtlResult<T> = Result<T, EtlError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // DatasetError -> ExtractError -> EtlError
        let dataset_err = DatasetError::NotAnObject {
            index: 3,
            found: "string".into(),
        };
        let extract_err: ExtractError = dataset_err.into();
        let etl_err: EtlError = extract_err.into();
        assert!(etl_err.to_string().contains("Document 3"));

        // RegistryError -> EtlError
        let registry_err = RegistryError::NotFound("abc".into());
        let etl_err: EtlError = registry_err.into();
        assert!(etl_err.to_string().contains("abc"));
    }

    #[test]
    fn test_step_error_format() {
        let err = StepError::DuplicateBinEdges {
            edges: vec![1.0, 1.0, 2.0, 3.0, 4.0],
        };
        let msg = err.to_string();
        assert!(msg.contains("unique"));
        assert!(msg.contains("1.0"));
    }
}
