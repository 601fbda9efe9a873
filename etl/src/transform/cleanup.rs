//! Duplicate and empty-row removal.

use std::collections::HashSet;

use super::step::{Step, StepOutcome};
use crate::models::Dataset;

/// Drop exact duplicates (first occurrence kept), then rows where every
/// column is null or blank.
pub fn remove_duplicates(dataset: &mut Dataset) -> StepOutcome {
    let before = dataset.len();

    let mut seen = HashSet::with_capacity(before);
    let first_seen: Vec<bool> = dataset
        .rows()
        .iter()
        .map(|row| seen.insert(dataset.row_key(row)))
        .collect();
    let mut keep = first_seen.into_iter();
    dataset.retain_rows(|_| keep.next().unwrap_or(true));

    let columns = dataset.columns().to_vec();
    dataset.retain_rows(|row| !columns.iter().all(|c| row.get(c).is_blank()));

    let after = dataset.len();
    StepOutcome::success(
        Step::RemoveDuplicates,
        format!("Cleanup: {} => {} ({} removed)", before, after, before - after),
    )
}
