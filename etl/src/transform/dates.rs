//! Date-like columns: ISO conversion and year/month/day/quarter derivation.
//!
//! A column is date-like when its name contains `date` (any case). Columns
//! this module derived itself (`<col>_year` next to an existing `<col>`)
//! are not selected again, so both steps can be re-run safely.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use super::step::{Step, StepOutcome};
use crate::error::StepResult;
use crate::logs::LogLevel;
use crate::models::{Cell, Dataset};

/// Suffixes of derived columns, in creation order.
pub const DATE_PARTS: [&str; 4] = ["year", "month", "day", "quarter"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

// =============================================================================
// Parsing
// =============================================================================

/// Lenient date parsing of a text value.
///
/// Accepts RFC 3339 / RFC 2822 timestamps, common date-time layouts and
/// plain dates (month-first for slashed dates). Time and offset are dropped.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        })
}

/// Only text cells can hold dates.
pub fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Text(text) => parse_date_str(text),
        _ => None,
    }
}

/// Calendar quarter, 1-4.
pub fn quarter(date: &NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

// =============================================================================
// Column selection
// =============================================================================

fn is_derived_part(dataset: &Dataset, column: &str) -> bool {
    DATE_PARTS.iter().any(|part| {
        column
            .strip_suffix(part)
            .and_then(|rest| rest.strip_suffix('_'))
            .is_some_and(|base| dataset.has_column(base))
    })
}

/// Columns whose name contains `date`, excluding derived date parts.
pub fn date_columns(dataset: &Dataset) -> Vec<String> {
    dataset
        .columns()
        .iter()
        .filter(|c| c.to_lowercase().contains("date"))
        .filter(|c| !is_derived_part(dataset, c))
        .cloned()
        .collect()
}

/// Parse a whole column; anything that is not a date is `None`.
fn parse_column(dataset: &Dataset, column: &str) -> Vec<Option<NaiveDate>> {
    dataset.column(column).iter().map(|c| parse_date(c)).collect()
}

// =============================================================================
// Steps
// =============================================================================

fn convert_column(dataset: &mut Dataset, column: &str) -> StepResult<()> {
    let cells = parse_column(dataset, column)
        .into_iter()
        .map(|date| {
            date.map(|d| Cell::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Cell::Null)
        })
        .collect();
    dataset.set_column(column, cells)?;
    Ok(())
}

fn derive_column(dataset: &mut Dataset, column: &str) -> StepResult<()> {
    let dates = parse_column(dataset, column);

    for part in DATE_PARTS {
        let cells = dates
            .iter()
            .map(|date| match date {
                Some(d) => Cell::Int(match part {
                    "year" => i64::from(d.year()),
                    "month" => i64::from(d.month()),
                    "day" => i64::from(d.day()),
                    _ => i64::from(quarter(d)),
                }),
                None => Cell::Null,
            })
            .collect();
        dataset.set_column(&format!("{}_{}", column, part), cells)?;
    }
    Ok(())
}

/// Run `apply` on every date column, collecting per-column failures.
fn for_each_date_column<F>(dataset: &mut Dataset, step: Step, mut apply: F) -> StepOutcome
where
    F: FnMut(&mut Dataset, &str) -> StepResult<()>,
{
    let columns = date_columns(dataset);
    if columns.is_empty() {
        return StepOutcome::skipped(step);
    }

    let mut done = Vec::new();
    let mut failures = Vec::new();
    for column in &columns {
        match apply(dataset, column) {
            Ok(()) => done.push(column.as_str()),
            Err(e) => failures.push(format!("'{}': {}", column, e)),
        }
    }

    let verb = match step {
        Step::ConvertDates => "convert",
        _ => "derive date parts from",
    };
    let mut failures = failures.into_iter().map(|f| format!("Could not {} {}", verb, f));

    let mut outcome = if done.is_empty() {
        let first = failures.next().unwrap_or_default();
        StepOutcome::failed(step, LogLevel::Warning, first)
    } else {
        let report = match step {
            Step::ConvertDates => format!("Dates converted to ISO format: {}", done.join(", ")),
            _ => format!("Date parts derived from: {}", done.join(", ")),
        };
        StepOutcome::success(step, report)
    };
    for failure in failures {
        outcome = outcome.with_warning(failure);
    }
    outcome
}

/// Rewrite every date-like column as `YYYY-MM-DD`; unparseable values become null.
pub fn convert_dates(dataset: &mut Dataset) -> StepOutcome {
    for_each_date_column(dataset, Step::ConvertDates, convert_column)
}

/// Add `<col>_year`, `<col>_month`, `<col>_day`, `<col>_quarter` for every
/// date-like column.
pub fn derive_date_parts(dataset: &mut Dataset) -> StepOutcome {
    for_each_date_column(dataset, Step::DeriveDateParts, derive_column)
}
