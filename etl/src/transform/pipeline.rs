//! Transform pipeline.
//!
//! Owns one in-memory batch and runs the fixed step sequence over it.
//!
//! # Example
//!
//! ```rust,ignore
//! use listings_etl::logs::RunLogger;
//! use listings_etl::transform::TransformPipeline;
//!
//! let logger = RunLogger::new("etl", RunLogger::new_run_id());
//! let mut pipeline = TransformPipeline::from_documents(&documents, &logger)?;
//! let dataset = pipeline.run();
//! println!("{}", pipeline.summary());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::step::{Step, StepOutcome, StepStatus};
use crate::error::DatasetResult;
use crate::logs::RunLogger;
use crate::models::Dataset;

/// Append-only list of report lines, one per executed step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report(Vec<String>);

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.0.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Runs the six transform steps over a working copy of a dataset.
///
/// The dataset passed in is kept as `original` and never modified.
pub struct TransformPipeline {
    original: Dataset,
    working: Dataset,
    report: Report,
    outcomes: Vec<StepOutcome>,
    logger: RunLogger,
}

impl TransformPipeline {
    pub fn new(dataset: Dataset, logger: &RunLogger) -> Self {
        Self {
            working: dataset.clone(),
            original: dataset,
            report: Report::new(),
            outcomes: Vec::new(),
            logger: logger.scoped("transform"),
        }
    }

    /// Build from raw documents.
    ///
    /// A document that is not an object fails here, before any step runs.
    pub fn from_documents(documents: &[Value], logger: &RunLogger) -> DatasetResult<Self> {
        let dataset = Dataset::from_documents(documents)?;
        Ok(Self::new(dataset, logger))
    }

    /// Apply one step to the working dataset and log its outcome.
    pub fn apply(&mut self, step: Step) -> &StepOutcome {
        let outcome = step.apply(&mut self.working);

        match outcome.status {
            StepStatus::Skipped => self.logger.debug(format!("Skipped {}: required column missing", step.name())),
            StepStatus::Failed => self.logger.debug(format!("{} failed", step.name())),
            StepStatus::Success | StepStatus::Partial => {}
        }
        for diagnostic in &outcome.diagnostics {
            self.logger.log(diagnostic.level, diagnostic.message.clone());
        }
        if let Some(ref line) = outcome.report {
            self.logger.info(line.clone());
            self.report.push(line.clone());
        }

        self.outcomes.push(outcome);
        &self.outcomes[self.outcomes.len() - 1]
    }

    pub fn remove_duplicates(&mut self) -> &StepOutcome {
        self.apply(Step::RemoveDuplicates)
    }

    pub fn normalize_price(&mut self) -> &StepOutcome {
        self.apply(Step::NormalizePrice)
    }

    pub fn convert_dates(&mut self) -> &StepOutcome {
        self.apply(Step::ConvertDates)
    }

    pub fn derive_date_parts(&mut self) -> &StepOutcome {
        self.apply(Step::DeriveDateParts)
    }

    pub fn categorize_price(&mut self) -> &StepOutcome {
        self.apply(Step::CategorizePrice)
    }

    pub fn expand_amenities(&mut self) -> &StepOutcome {
        self.apply(Step::ExpandAmenities)
    }

    /// Run every step in order and return the transformed dataset.
    ///
    /// Steps run unconditionally: a failed step is logged and the next one
    /// sees the dataset as the failed step left it.
    pub fn run(&mut self) -> &Dataset {
        self.logger.info(format!(
            "Transforming {} rows, {} columns",
            self.working.len(),
            self.working.columns().len()
        ));
        for step in Step::ALL {
            self.apply(step);
        }
        self.logger.success(format!(
            "Transformation finished: {} rows, {} columns",
            self.working.len(),
            self.working.columns().len()
        ));
        &self.working
    }

    pub fn dataset(&self) -> &Dataset {
        &self.working
    }

    pub fn into_dataset(self) -> Dataset {
        self.working
    }

    /// The dataset as it was before any step ran.
    pub fn original(&self) -> &Dataset {
        &self.original
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    /// Report lines followed by the final shape of the dataset.
    pub fn summary(&self) -> String {
        let mut out = String::from("Transformation report:\n");
        for line in self.report.lines() {
            out.push_str(&format!("  - {}\n", line));
        }
        out.push_str(&format!(
            "Final dataset: {} rows, {} columns\n",
            self.working.len(),
            self.working.columns().len()
        ));
        out
    }
}
