//! REST API types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::parser::ParseResult;
use crate::transform::{Step, StepOutcome, TransformPipeline};

/// Response sent after a transformation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    /// Run id, also used in the log file name
    pub run_id: String,

    /// Status: "ready", "warning"
    pub status: String,

    /// Transformed rows as JSON objects
    pub documents: Vec<Value>,

    /// Metadata about the transformation
    pub metadata: ResponseMetadata,
}

/// Metadata about the transformation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub input_rows: usize,
    pub output_rows: usize,
    pub columns: Vec<String>,

    /// One line per executed step
    pub report: Vec<String>,

    pub steps: Vec<StepOutcome>,

    /// Present for CSV uploads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_info: Option<CsvMetadata>,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub file_name: Option<String>,
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl CsvMetadata {
    pub fn new(parsed: &ParseResult, file_name: Option<String>) -> Self {
        Self {
            file_name,
            encoding: parsed.encoding.clone(),
            delimiter: match parsed.delimiter {
                '\t' => "TAB".to_string(),
                d => d.to_string(),
            },
            row_count: parsed.dataset.len(),
            columns: parsed.headers.clone(),
        }
    }
}

/// A step as listed by `GET /api/steps`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInfo {
    pub order: usize,
    pub name: String,
    pub description: String,
}

impl StepInfo {
    pub fn all() -> Vec<StepInfo> {
        Step::ALL
            .iter()
            .enumerate()
            .map(|(i, step)| StepInfo {
                order: i + 1,
                name: step.name().to_string(),
                description: step.description().to_string(),
            })
            .collect()
    }
}

impl TransformResponse {
    /// Build from a pipeline that has run.
    pub fn from_pipeline(run_id: &str, pipeline: &TransformPipeline, csv_info: Option<CsvMetadata>) -> Self {
        let clean = pipeline.outcomes().iter().all(|o| o.diagnostics.is_empty());
        let dataset = pipeline.dataset();

        TransformResponse {
            run_id: run_id.to_string(),
            status: if clean { "ready" } else { "warning" }.to_string(),
            documents: dataset.to_documents(),
            metadata: ResponseMetadata {
                input_rows: pipeline.original().len(),
                output_rows: dataset.len(),
                columns: dataset.columns().to_vec(),
                report: pipeline.report().lines().to_vec(),
                steps: pipeline.outcomes().to_vec(),
                csv_info,
            },
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
        "documents": [],
    })
}
