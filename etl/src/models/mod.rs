//! Domain models for the listings pipeline.
//!
//! - [`Cell`] - a single typed value in a dataset
//! - [`PriceCategory`] - quartile label derived from `price`
//! - [`Dataset`] / [`Row`] - the in-memory table the steps operate on

pub mod dataset;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::borrow::Cow;
use std::fmt;

pub use dataset::{Dataset, Row, AMENITIES, PRICE, PRICE_CATEGORY};

// =============================================================================
// Cell
// =============================================================================

/// A typed cell value.
///
/// Source documents are heterogeneous; each value is mapped onto one of
/// these variants when the dataset is built. `List` only appears after the
/// amenities step has split the `amenities` column.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl Cell {
    /// Build a cell from a JSON value.
    ///
    /// MongoDB extended JSON wrappers (`$oid`, `$date`, `$numberDecimal`, ...)
    /// are unwrapped. Any other nested object or array is kept as its JSON
    /// text so the string-oriented steps can still see it.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => Self::from_number(n),
            Value::String(s) => Cell::Text(s.clone()),
            Value::Object(map) if map.len() == 1 => map
                .iter()
                .next()
                .and_then(|(key, inner)| Self::from_extended(key, inner))
                .unwrap_or_else(|| Cell::Text(value.to_string())),
            other => Cell::Text(other.to_string()),
        }
    }

    fn from_number(n: &Number) -> Self {
        match n.as_i64() {
            Some(i) => Cell::Int(i),
            None => n.as_f64().map(Cell::Float).unwrap_or(Cell::Null),
        }
    }

    fn from_extended(key: &str, inner: &Value) -> Option<Self> {
        match (key, inner) {
            ("$oid", Value::String(s)) => Some(Cell::Text(s.clone())),
            ("$date", Value::String(s)) => Some(Cell::Text(s.clone())),
            ("$date", Value::Number(n)) => n.as_i64().and_then(millis_to_text),
            ("$date", Value::Object(wrapped)) => wrapped
                .get("$numberLong")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(millis_to_text),
            ("$numberDecimal" | "$numberDouble", Value::String(s)) => Some(
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Cell::Float)
                    .unwrap_or_else(|| Cell::Text(s.clone())),
            ),
            ("$numberLong" | "$numberInt", Value::String(s)) => {
                Some(s.parse::<i64>().map(Cell::Int).unwrap_or_else(|_| Cell::Text(s.clone())))
            }
            _ => None,
        }
    }

    /// Convert back to JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => Value::from(*i),
            Cell::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Null, whitespace-only text or an empty list.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Numeric value of `Int` and `Float` cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Textual form of scalar cells. `Null` and `List` have none.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Cell::Int(i) => Some(Cow::Owned(i.to_string())),
            Cell::Float(f) => Some(Cow::Owned(f.to_string())),
            Cell::Bool(b) => Some(Cow::Owned(b.to_string())),
            Cell::Null | Cell::List(_) => None,
        }
    }

    /// Canonical text used for exact-duplicate detection.
    ///
    /// Distinguishes types: `Int(1)`, `Float(1.0)` and `Text("1")` differ.
    pub fn key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Text(s) => f.write_str(s),
            Cell::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Int(i)
    }
}

impl From<f64> for Cell {
    fn from(f: f64) -> Self {
        Cell::Float(f)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

fn millis_to_text(millis: i64) -> Option<Cell> {
    chrono::DateTime::from_timestamp_millis(millis).map(|dt| Cell::Text(dt.to_rfc3339()))
}

// =============================================================================
// Price Category
// =============================================================================

/// Ordered price quartile label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriceCategory {
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Mid-Low")]
    MidLow,
    #[serde(rename = "Mid-High")]
    MidHigh,
    #[serde(rename = "High")]
    High,
}

impl PriceCategory {
    /// All labels, lowest first.
    pub const ALL: [PriceCategory; 4] = [Self::Low, Self::MidLow, Self::MidHigh, Self::High];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::MidLow => "Mid-Low",
            Self::MidHigh => "Mid-High",
            Self::High => "High",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label.trim())
    }

    /// Label of the zero-based quartile bin.
    pub fn from_bin(bin: usize) -> Option<Self> {
        Self::ALL.get(bin).copied()
    }
}

impl fmt::Display for PriceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_from_scalars() {
        assert_eq!(Cell::from_json(&json!(null)), Cell::Null);
        assert_eq!(Cell::from_json(&json!(3)), Cell::Int(3));
        assert_eq!(Cell::from_json(&json!(2.5)), Cell::Float(2.5));
        assert_eq!(Cell::from_json(&json!("x")), Cell::Text("x".into()));
        assert_eq!(Cell::from_json(&json!(true)), Cell::Bool(true));
    }

    #[test]
    fn test_cell_unwraps_extended_json() {
        assert_eq!(
            Cell::from_json(&json!({"$oid": "5f1d"})),
            Cell::Text("5f1d".into())
        );
        assert_eq!(
            Cell::from_json(&json!({"$numberDecimal": "80.00"})),
            Cell::Float(80.0)
        );
        assert_eq!(
            Cell::from_json(&json!({"$numberLong": "42"})),
            Cell::Int(42)
        );
        let date = Cell::from_json(&json!({"$date": {"$numberLong": "1550293200000"}}));
        assert!(date.as_text().unwrap().starts_with("2019-02-16"));
    }

    #[test]
    fn test_nested_values_kept_as_json_text() {
        let cell = Cell::from_json(&json!(["Wifi", "Kitchen"]));
        assert_eq!(cell, Cell::Text(r#"["Wifi","Kitchen"]"#.into()));

        let cell = Cell::from_json(&json!({"street": "A", "city": "B"}));
        assert!(matches!(cell, Cell::Text(ref s) if s.contains("street")));
    }

    #[test]
    fn test_cell_key_distinguishes_types() {
        assert_ne!(Cell::Int(1).key(), Cell::Float(1.0).key());
        assert_ne!(Cell::Int(1).key(), Cell::Text("1".into()).key());
        assert_eq!(Cell::Text("a".into()).key(), Cell::from("a").key());
    }

    #[test]
    fn test_blank_cells() {
        assert!(Cell::Null.is_blank());
        assert!(Cell::Text("  ".into()).is_blank());
        assert!(Cell::List(vec![]).is_blank());
        assert!(!Cell::Int(0).is_blank());
    }

    #[test]
    fn test_price_category_order_and_labels() {
        assert!(PriceCategory::Low < PriceCategory::MidLow);
        assert!(PriceCategory::MidHigh < PriceCategory::High);
        assert_eq!(PriceCategory::from_label("Mid-High"), Some(PriceCategory::MidHigh));
        assert_eq!(PriceCategory::from_bin(3), Some(PriceCategory::High));
        assert_eq!(PriceCategory::from_bin(4), None);
        assert_eq!(
            serde_json::to_string(&PriceCategory::MidLow).unwrap(),
            "\"Mid-Low\""
        );
    }
}
