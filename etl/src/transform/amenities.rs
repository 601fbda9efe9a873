//! Amenities expansion.
//!
//! `amenities` arrives as one string per listing, e.g. `{"Wifi","Kitchen"}`
//! or `["Wifi", "Kitchen"]`. The step splits it into a list, ranks amenity
//! names by frequency across the dataset and adds one 0/1 column for each of
//! the ten most frequent.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::step::{Step, StepOutcome};
use crate::error::{StepError, StepResult};
use crate::logs::LogLevel;
use crate::models::{Cell, Dataset, AMENITIES};

/// Prefix of every amenity flag column.
pub const AMENITY_PREFIX: &str = "amenity_";

/// Number of amenities turned into columns.
pub const TOP_AMENITIES: usize = 10;

/// Braces, brackets and double quotes around the list and its items.
static LIST_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[{}\[\]"]"#).expect("valid amenities regex"));

/// Split one `amenities` cell into trimmed, non-empty names.
pub fn split_amenities(cell: &Cell) -> Vec<String> {
    match cell {
        Cell::Null => Vec::new(),
        Cell::List(items) => items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        other => other
            .as_text()
            .map(|text| {
                LIST_PUNCTUATION
                    .replace_all(&text, "")
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// `"Air conditioning"` -> `"amenity_air_conditioning"`
pub fn column_name(amenity: &str) -> String {
    format!("{}{}", AMENITY_PREFIX, amenity.replace(' ', "_").to_lowercase())
}

/// The `n` most frequent names with their counts.
///
/// Ties keep the order in which names were first encountered.
pub fn top_amenities(lists: &[Vec<String>], n: usize) -> Vec<(String, usize)> {
    let mut first_seen: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for name in lists.iter().flatten() {
        let count = counts.entry(name.as_str()).or_insert_with(|| {
            first_seen.push(name.as_str());
            0
        });
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = first_seen
        .into_iter()
        .map(|name| (name.to_string(), counts[name]))
        .collect();
    // Stable sort keeps first-seen order among equal counts
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}

/// A flag column and the amenity names it covers.
struct FlagColumn {
    name: String,
    amenities: Vec<String>,
}

/// Group selected amenities by column name, in rank order.
///
/// Names that normalize to the same column share it: the flag is 1 when the
/// row has any of them.
fn flag_columns(selected: &[(String, usize)]) -> Vec<FlagColumn> {
    let mut columns: Vec<FlagColumn> = Vec::new();
    for (amenity, _) in selected {
        let name = column_name(amenity);
        match columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.amenities.push(amenity.clone()),
            None => columns.push(FlagColumn {
                name,
                amenities: vec![amenity.clone()],
            }),
        }
    }
    columns
}

fn is_flag_column(dataset: &Dataset, column: &str) -> bool {
    dataset
        .column(column)
        .iter()
        .all(|c| matches!(c.as_ref(), Cell::Null | Cell::Int(0) | Cell::Int(1)))
}

struct Expansion {
    lists: Vec<Vec<String>>,
    columns: Vec<(FlagColumn, Vec<Cell>)>,
}

fn expand(dataset: &Dataset) -> StepResult<Expansion> {
    let lists: Vec<Vec<String>> = dataset.rows().iter().map(|r| split_amenities(&r.amenities)).collect();
    let selected = top_amenities(&lists, TOP_AMENITIES);

    let mut columns = Vec::new();
    for flag in flag_columns(&selected) {
        if dataset.has_column(&flag.name) && !is_flag_column(dataset, &flag.name) {
            return Err(StepError::AmenityColumnConflict { column: flag.name });
        }
        let values = lists
            .iter()
            .map(|list| {
                let present = list.iter().any(|a| flag.amenities.contains(a));
                Cell::Int(i64::from(present))
            })
            .collect();
        columns.push((flag, values));
    }

    Ok(Expansion { lists, columns })
}

/// Split `amenities` into lists and add the top-10 flag columns.
///
/// Everything is computed before the dataset is touched; on failure the
/// step adds no columns.
pub fn expand_amenities(dataset: &mut Dataset) -> StepOutcome {
    if !dataset.has_column(AMENITIES) {
        return StepOutcome::skipped(Step::ExpandAmenities);
    }

    let expansion = match expand(dataset) {
        Ok(expansion) => expansion,
        Err(e) => {
            return StepOutcome::failed(
                Step::ExpandAmenities,
                LogLevel::Error,
                format!("Error expanding amenities: {}", e),
            )
        }
    };

    for (row, list) in dataset.rows_mut().iter_mut().zip(expansion.lists) {
        row.amenities = if list.is_empty() { Cell::Null } else { Cell::List(list) };
    }

    let mut merged = Vec::new();
    let mut names = Vec::new();
    for (flag, values) in expansion.columns {
        if let Err(e) = dataset.set_column(&flag.name, values) {
            return StepOutcome::failed(
                Step::ExpandAmenities,
                LogLevel::Error,
                format!("Error expanding amenities: {}", e),
            );
        }
        if flag.amenities.len() > 1 {
            merged.push(format!("{} share column {}", flag.amenities.join(" / "), flag.name));
        }
        names.push(flag.name);
    }

    let report = if names.is_empty() {
        "Amenities expansion: no amenity values found".to_string()
    } else {
        format!("Amenities expansion (top {}): {}", TOP_AMENITIES, names.join(", "))
    };

    merged
        .into_iter()
        .fold(StepOutcome::success(Step::ExpandAmenities, report), |outcome, m| {
            outcome.with_warning(format!("Amenity names collide, flags merged: {}", m))
        })
}
