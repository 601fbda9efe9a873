//! Transform steps.
//!
//! The pipeline runs a fixed list of steps. Each step mutates the working
//! dataset and returns a [`StepOutcome`] instead of an error: failures stay
//! local to the step and are reported as diagnostics.

use serde::{Deserialize, Serialize};

use super::{amenities, cleanup, dates, price};
use crate::logs::LogLevel;
use crate::models::Dataset;

/// All transform steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Drop exact duplicate rows and rows with no values
    RemoveDuplicates,

    /// Strip currency formatting from `price` and parse it as a number
    NormalizePrice,

    /// Rewrite every `*date*` column as `YYYY-MM-DD`
    ConvertDates,

    /// Add `_year`, `_month`, `_day`, `_quarter` columns for every `*date*` column
    DeriveDateParts,

    /// Bin `price` into quartile labels in `price_category`
    CategorizePrice,

    /// One 0/1 column per top-10 amenity
    ExpandAmenities,
}

impl Step {
    /// Execution order.
    pub const ALL: [Step; 6] = [
        Step::RemoveDuplicates,
        Step::NormalizePrice,
        Step::ConvertDates,
        Step::DeriveDateParts,
        Step::CategorizePrice,
        Step::ExpandAmenities,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::RemoveDuplicates => "remove_duplicates",
            Step::NormalizePrice => "normalize_price",
            Step::ConvertDates => "convert_dates",
            Step::DeriveDateParts => "derive_date_parts",
            Step::CategorizePrice => "categorize_price",
            Step::ExpandAmenities => "expand_amenities",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Step::RemoveDuplicates => "Remove exact duplicate rows and rows where every column is empty",
            Step::NormalizePrice => "Strip currency symbols and thousands separators from `price`; unparseable values become null",
            Step::ConvertDates => "Rewrite columns whose name contains `date` as YYYY-MM-DD; unparseable values become null",
            Step::DeriveDateParts => "Add <col>_year, <col>_month, <col>_day and <col>_quarter for every date column",
            Step::CategorizePrice => "Assign Low / Mid-Low / Mid-High / High by price quartile into `price_category`",
            Step::ExpandAmenities => "Split `amenities` and add amenity_<name> 0/1 columns for the 10 most frequent",
        }
    }

    /// Apply this step to the dataset
    pub fn apply(&self, dataset: &mut Dataset) -> StepOutcome {
        match self {
            Step::RemoveDuplicates => cleanup::remove_duplicates(dataset),
            Step::NormalizePrice => price::normalize_price(dataset),
            Step::ConvertDates => dates::convert_dates(dataset),
            Step::DeriveDateParts => dates::derive_date_parts(dataset),
            Step::CategorizePrice => price::categorize_price(dataset),
            Step::ExpandAmenities => amenities::expand_amenities(dataset),
        }
    }
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Precondition unmet (required column absent)
    Skipped,
    Success,
    /// Completed, with some values or columns left out
    Partial,
    /// Aborted; the step contributed nothing
    Failed,
}

/// A warning or error raised inside a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: LogLevel,
    pub message: String,
}

/// Result of applying one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: Step,
    pub status: StepStatus,
    /// Report line, present when the step ran
    pub report: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl StepOutcome {
    pub fn skipped(step: Step) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            report: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn success(step: Step, report: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Success,
            report: Some(report.into()),
            diagnostics: Vec::new(),
        }
    }

    pub fn failed(step: Step, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            report: None,
            diagnostics: vec![Diagnostic {
                level,
                message: message.into(),
            }],
        }
    }

    /// Attach a warning; a successful step becomes partial.
    pub fn with_warning(mut self, message: impl Into<String>) -> Self {
        if self.status == StepStatus::Success {
            self.status = StepStatus::Partial;
        }
        self.diagnostics.push(Diagnostic {
            level: LogLevel::Warning,
            message: message.into(),
        });
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Human-readable list of the steps, in order
pub fn steps_description() -> String {
    let mut out = String::from("Transform steps (executed in this order):\n");
    for (i, step) in Step::ALL.iter().enumerate() {
        out.push_str(&format!("\n  {}. {:<18} {}", i + 1, step.name(), step.description()));
    }
    out.push('\n');
    out
}
