//! Price normalization and quartile categorization.

use once_cell::sync::Lazy;
use regex::Regex;

use super::step::{Step, StepOutcome};
use crate::error::{StepError, StepResult};
use crate::logs::LogLevel;
use crate::models::{Cell, Dataset, PriceCategory, PRICE, PRICE_CATEGORY};

/// Currency symbols, thousands separators and stray whitespace.
static PRICE_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{Sc},\s]").expect("valid price regex"));

// =============================================================================
// Normalization
// =============================================================================

/// Parse a formatted price such as `"$1,200.00"`.
///
/// Returns `None` for empty or unparseable text and for non-finite numbers.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = PRICE_NOISE.replace_all(raw, "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Normalized cell plus whether a non-empty value was discarded.
fn normalize_cell(row: usize, cell: &Cell) -> StepResult<(Cell, bool)> {
    match cell {
        Cell::Null => Ok((Cell::Null, false)),
        Cell::Int(_) | Cell::Float(_) => match cell.as_f64().filter(|f| f.is_finite()) {
            Some(value) => Ok((Cell::Float(value), false)),
            None => Ok((Cell::Null, true)),
        },
        Cell::Text(text) => match parse_price(text) {
            Some(value) => Ok((Cell::Float(value), false)),
            None => Ok((Cell::Null, !text.trim().is_empty())),
        },
        Cell::Bool(_) => Ok((Cell::Null, true)),
        Cell::List(_) => Err(StepError::UnsupportedPrice {
            row,
            value: cell.to_string(),
        }),
    }
}

/// Rewrite `price` as a float or null.
///
/// The new column is computed in full before it is written, so an aborted
/// step leaves `price` untouched.
pub fn normalize_price(dataset: &mut Dataset) -> StepOutcome {
    if !dataset.has_column(PRICE) {
        return StepOutcome::skipped(Step::NormalizePrice);
    }

    let normalized: StepResult<Vec<(Cell, bool)>> = dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| normalize_cell(i, &row.price))
        .collect();

    let normalized = match normalized {
        Ok(values) => values,
        Err(e) => {
            return StepOutcome::failed(
                Step::NormalizePrice,
                LogLevel::Error,
                format!("Error normalizing prices: {}", e),
            )
        }
    };

    let discarded = normalized.iter().filter(|(_, discarded)| *discarded).count();
    let mut parsed = 0;
    for (row, (value, _)) in dataset.rows_mut().iter_mut().zip(normalized) {
        if !value.is_null() {
            parsed += 1;
        }
        row.price = value;
    }

    let outcome = StepOutcome::success(
        Step::NormalizePrice,
        format!(
            "Price normalization: {} numeric, {} null",
            parsed,
            dataset.len() - parsed
        ),
    );
    if discarded > 0 {
        outcome.with_warning(format!("{} price values could not be parsed and were set to null", discarded))
    } else {
        outcome
    }
}

// =============================================================================
// Categorization
// =============================================================================

/// Quantile with linear interpolation between closest ranks.
///
/// `sorted` must be non-empty and ascending.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Quartile bin edges `[min, q1, median, q3, max]`.
///
/// Fails when two edges coincide, which happens on degenerate
/// distributions (e.g. fewer than four distinct prices).
pub fn quartile_edges(values: &[f64]) -> StepResult<[f64; 5]> {
    if values.is_empty() {
        return Err(StepError::NoPrices);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let edges = [0.0, 0.25, 0.5, 0.75, 1.0].map(|q| quantile(&sorted, q));
    if edges.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(StepError::DuplicateBinEdges { edges: edges.to_vec() });
    }
    Ok(edges)
}

/// Bins are right-closed; the lowest bin also includes the minimum.
fn bin_for(value: f64, edges: &[f64; 5]) -> PriceCategory {
    let bin = edges[1..4].iter().position(|&edge| value <= edge).unwrap_or(3);
    PriceCategory::ALL[bin]
}

fn price_categories(dataset: &Dataset) -> StepResult<Vec<Option<PriceCategory>>> {
    let prices = dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| match &row.price {
            Cell::Null => Ok(None),
            cell => cell
                .as_f64()
                .filter(|f| f.is_finite())
                .map(Some)
                .ok_or_else(|| StepError::NonNumericPrice {
                    row: i,
                    value: cell.to_string(),
                }),
        })
        .collect::<StepResult<Vec<Option<f64>>>>()?;

    let present: Vec<f64> = prices.iter().flatten().copied().collect();
    let edges = quartile_edges(&present)?;

    Ok(prices.into_iter().map(|p| p.map(|v| bin_for(v, &edges))).collect())
}

/// Assign quartile labels into `price_category`.
pub fn categorize_price(dataset: &mut Dataset) -> StepOutcome {
    if !dataset.has_column(PRICE) {
        return StepOutcome::skipped(Step::CategorizePrice);
    }

    let categories = match price_categories(dataset) {
        Ok(categories) => categories,
        Err(e) => {
            return StepOutcome::failed(
                Step::CategorizePrice,
                LogLevel::Warning,
                format!("Could not categorize prices: {}", e),
            )
        }
    };

    let mut counts = [0usize; 4];
    for (row, category) in dataset.rows_mut().iter_mut().zip(categories) {
        if let Some(c) = category {
            counts[c as usize] += 1;
        }
        row.set_price_category(category);
    }
    dataset.ensure_column(PRICE_CATEGORY);

    let summary = PriceCategory::ALL
        .iter()
        .zip(counts)
        .map(|(c, n)| format!("{}={}", c, n))
        .collect::<Vec<_>>()
        .join(", ");
    StepOutcome::success(Step::CategorizePrice, format!("Price categories: {}", summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::step::StepStatus;
    use serde_json::json;

    fn prices(values: Vec<serde_json::Value>) -> Dataset {
        let docs: Vec<_> = values.into_iter().map(|p| json!({ "price": p })).collect();
        Dataset::from_documents(&docs).unwrap()
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$1,200"), Some(1200.0));
        assert_eq!(parse_price("€ 85.50"), Some(85.5));
        assert_eq!(parse_price("850"), Some(850.0));
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("$"), None);
        assert_eq!(parse_price("bad"), None);
        assert_eq!(parse_price("inf"), None);
    }

    #[test]
    fn test_normalize_scenario() {
        let mut dataset = prices(vec![json!("$1,200"), json!("850"), json!(""), json!("bad")]);
        let outcome = normalize_price(&mut dataset);

        let values: Vec<Cell> = dataset.rows().iter().map(|r| r.price.clone()).collect();
        assert_eq!(
            values,
            vec![Cell::Float(1200.0), Cell::Float(850.0), Cell::Null, Cell::Null]
        );
        assert_eq!(outcome.status, StepStatus::Partial);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.report.is_some());
    }

    #[test]
    fn test_normalize_keeps_numbers() {
        let mut dataset = prices(vec![json!(10), json!(12.5), json!(null)]);
        let outcome = normalize_price(&mut dataset);
        assert_eq!(outcome.status, StepStatus::Success);
        assert_eq!(dataset.rows()[0].price, Cell::Float(10.0));
        assert_eq!(dataset.rows()[2].price, Cell::Null);
    }

    #[test]
    fn test_normalize_without_price_column_is_skipped() {
        let mut dataset = Dataset::from_documents(&[json!({"id": 1})]).unwrap();
        let outcome = normalize_price(&mut dataset);
        assert_eq!(outcome.status, StepStatus::Skipped);
        assert!(outcome.report.is_none());
    }

    #[test]
    fn test_normalize_failure_leaves_column_untouched() {
        let mut dataset = prices(vec![json!("$5"), json!("$6")]);
        dataset.rows_mut()[1].price = Cell::List(vec!["a".into()]);
        let outcome = normalize_price(&mut dataset);

        assert!(outcome.is_failed());
        assert_eq!(outcome.diagnostics[0].level, LogLevel::Error);
        assert_eq!(dataset.rows()[0].price, Cell::Text("$5".into()));
    }

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.25), 1.75);
        assert_eq!(quantile(&sorted, 0.5), 2.5);
        assert_eq!(quantile(&sorted, 1.0), 4.0);
    }

    #[test]
    fn test_categorize_four_values() {
        let mut dataset = prices(vec![json!(4.0), json!(1.0), json!(null), json!(3.0), json!(2.0)]);
        let outcome = categorize_price(&mut dataset);

        assert_eq!(outcome.status, StepStatus::Success);
        let labels: Vec<Option<PriceCategory>> =
            dataset.rows().iter().map(|r| r.price_category).collect();
        assert_eq!(
            labels,
            vec![
                Some(PriceCategory::High),
                Some(PriceCategory::Low),
                None,
                Some(PriceCategory::MidHigh),
                Some(PriceCategory::MidLow),
            ]
        );
        assert!(dataset.has_column(PRICE_CATEGORY));
    }

    #[test]
    fn test_categorize_is_monotonic() {
        let values = [50.0, 75.0, 75.0, 120.0, 80.0, 300.0, 45.0, 99.0, 150.0, 60.0];
        let mut dataset = prices(values.iter().map(|v| json!(v)).collect());
        categorize_price(&mut dataset);

        let rows = dataset.rows();
        for a in rows {
            for b in rows {
                if a.price.as_f64() > b.price.as_f64() {
                    assert!(a.price_category >= b.price_category);
                }
            }
        }
    }

    #[test]
    fn test_degenerate_distribution_is_a_warning() {
        let mut dataset = prices(vec![json!(10.0), json!(10.0), json!(10.0), json!(20.0)]);
        let outcome = categorize_price(&mut dataset);

        assert!(outcome.is_failed());
        assert_eq!(outcome.diagnostics[0].level, LogLevel::Warning);
        assert!(outcome.diagnostics[0].message.contains("unique"));
        assert!(!dataset.has_column(PRICE_CATEGORY));
        assert!(dataset.rows().iter().all(|r| r.price_category.is_none()));
    }

    #[test]
    fn test_categorize_rejects_unnormalized_prices() {
        let mut dataset = prices(vec![json!("$10"), json!(20.0)]);
        let outcome = categorize_price(&mut dataset);
        assert!(outcome.is_failed());
    }

    #[test]
    fn test_categorize_is_idempotent() {
        let mut dataset = prices((1..=12).map(|v| json!(v as f64 * 10.0)).collect());
        categorize_price(&mut dataset);
        let once = dataset.clone();
        categorize_price(&mut dataset);
        assert_eq!(once, dataset);
    }
}
