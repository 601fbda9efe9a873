//! Extraction from a document store.
//!
//! Two stores are supported:
//!
//! - [`DocumentDir`]: a directory holding one file per collection
//!   (`<collection>.json`, `.jsonl`, `.ndjson` or `.csv`)
//! - [`DataApiClient`]: an HTTP document store speaking the `action/find`
//!   protocol
//!
//! [`Source`] picks one of them from configuration.

pub mod data_api;

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::EtlConfig;
use crate::error::{ExtractError, ExtractResult};
use crate::models::Dataset;
use crate::parser::parse_bytes_auto;

pub use data_api::DataApiClient;

/// A store that can hand over one collection as a dataset.
///
/// A missing collection is an error; an empty one is an empty dataset.
#[allow(async_fn_in_trait)]
pub trait Extractor {
    async fn fetch(&self, collection: &str) -> ExtractResult<Dataset>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

// =============================================================================
// Directory store
// =============================================================================

/// File extensions tried for a collection, in order
const COLLECTION_EXTENSIONS: [&str; 4] = ["json", "jsonl", "ndjson", "csv"];

/// Collections stored as files in a directory.
#[derive(Debug, Clone)]
pub struct DocumentDir {
    dir: PathBuf,
}

impl DocumentDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First existing `<collection>.<ext>` file.
    pub fn collection_path(&self, collection: &str) -> Option<PathBuf> {
        COLLECTION_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", collection, ext)))
            .find(|path| path.is_file())
    }
}

impl Extractor for DocumentDir {
    async fn fetch(&self, collection: &str) -> ExtractResult<Dataset> {
        let path = self
            .collection_path(collection)
            .ok_or_else(|| ExtractError::CollectionNotFound(format!("{} in {}", collection, self.dir.display())))?;

        let bytes = tokio::fs::read(&path).await?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Ok(parse_bytes_auto(&bytes)?.dataset),
            Some("jsonl") | Some("ndjson") => {
                let documents = parse_json_lines(&bytes)?;
                Ok(Dataset::from_documents(&documents)?)
            }
            _ => {
                let documents = parse_json_documents(&bytes)?;
                Ok(Dataset::from_documents(&documents)?)
            }
        }
    }

    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }
}

/// A JSON array of documents, or an object wrapping one under `documents`.
pub fn parse_json_documents(bytes: &[u8]) -> ExtractResult<Vec<Value>> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| ExtractError::InvalidJson(e.to_string()))?;
    match value {
        Value::Array(documents) => Ok(documents),
        Value::Object(mut map) => match map.remove("documents") {
            Some(Value::Array(documents)) => Ok(documents),
            _ => Err(ExtractError::InvalidJson(
                "expected an array of documents or a `documents` array".to_string(),
            )),
        },
        other => Err(ExtractError::InvalidJson(format!(
            "expected an array of documents, found {}",
            other
        ))),
    }
}

/// One JSON document per line; blank lines are skipped.
pub fn parse_json_lines(bytes: &[u8]) -> ExtractResult<Vec<Value>> {
    String::from_utf8_lossy(bytes)
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| ExtractError::InvalidJson(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

// =============================================================================
// Configured source
// =============================================================================

/// The store selected by configuration.
#[derive(Debug, Clone)]
pub enum Source {
    Directory(DocumentDir),
    DataApi(DataApiClient),
}

impl Source {
    /// The HTTP store when `LISTINGS_DATA_API_URL` is set, the directory otherwise.
    pub fn from_config(config: &EtlConfig) -> Self {
        match &config.data_api {
            Some(api) => Source::DataApi(DataApiClient::new(api.clone())),
            None => Source::Directory(DocumentDir::new(&config.source_dir)),
        }
    }
}

impl Extractor for Source {
    async fn fetch(&self, collection: &str) -> ExtractResult<Dataset> {
        match self {
            Source::Directory(dir) => dir.fetch(collection).await,
            Source::DataApi(client) => client.fetch(collection).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Source::Directory(dir) => dir.describe(),
            Source::DataApi(client) => client.describe(),
        }
    }
}
