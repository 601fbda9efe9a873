//! In-memory tabular dataset.
//!
//! A [`Row`] keeps the columns the pipeline knows about as typed fields
//! (`price`, `amenities`, `price_category`) and everything discovered at
//! runtime (source columns, derived date parts, amenity flags) in a side map.
//! The [`Dataset`] owns the ordered column list; a column missing from a
//! row's map reads as [`Cell::Null`].

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;

use super::{Cell, PriceCategory};
use crate::error::{DatasetError, DatasetResult};

/// Listing price column.
pub const PRICE: &str = "price";

/// Delimited amenity list column.
pub const AMENITIES: &str = "amenities";

/// Derived price quartile column.
pub const PRICE_CATEGORY: &str = "price_category";

static NULL: Cell = Cell::Null;

// =============================================================================
// Row
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub price: Cell,
    pub amenities: Cell,
    pub price_category: Option<PriceCategory>,
    extra: HashMap<String, Cell>,
}

impl Row {
    /// Read a column. Unknown columns read as null.
    pub fn get(&self, column: &str) -> Cow<'_, Cell> {
        match column {
            PRICE => Cow::Borrowed(&self.price),
            AMENITIES => Cow::Borrowed(&self.amenities),
            PRICE_CATEGORY => match self.price_category {
                Some(c) => Cow::Owned(Cell::Text(c.label().to_string())),
                None => Cow::Borrowed(self.extra.get(PRICE_CATEGORY).unwrap_or(&NULL)),
            },
            other => Cow::Borrowed(self.extra.get(other).unwrap_or(&NULL)),
        }
    }

    /// Write a column. Does not register the column on the dataset.
    ///
    /// A `price_category` value that is not one of the four labels is kept
    /// as is until the column is recomputed.
    pub fn set(&mut self, column: &str, value: Cell) {
        match column {
            PRICE => self.price = value,
            AMENITIES => self.amenities = value,
            PRICE_CATEGORY => {
                let known = value.as_text().and_then(|t| PriceCategory::from_label(&t));
                match known {
                    Some(category) => self.set_price_category(Some(category)),
                    None => {
                        self.price_category = None;
                        self.set_extra(PRICE_CATEGORY, value);
                    }
                }
            }
            other => self.set_extra(other, value),
        }
    }

    /// Replace the price category, dropping any unrecognised source value.
    pub fn set_price_category(&mut self, category: Option<PriceCategory>) {
        self.price_category = category;
        self.extra.remove(PRICE_CATEGORY);
    }

    fn set_extra(&mut self, column: &str, value: Cell) {
        if value.is_null() {
            self.extra.remove(column);
        } else {
            self.extra.insert(column.to_string(), value);
        }
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// Ordered rows sharing one column namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from source documents.
    ///
    /// The column set is the union of all keys, in first-seen order.
    /// Fails if any document is not an object.
    pub fn from_documents(documents: &[Value]) -> DatasetResult<Self> {
        let mut dataset = Self::new();

        for (index, document) in documents.iter().enumerate() {
            let object = document.as_object().ok_or_else(|| DatasetError::NotAnObject {
                index,
                found: json_kind(document).to_string(),
            })?;

            let mut row = Row::default();
            for (key, value) in object {
                dataset.ensure_column(key);
                row.set(key, Cell::from_json(value));
            }
            dataset.rows.push(row);
        }

        Ok(dataset)
    }

    /// Build a dataset from positional records.
    pub fn from_records(columns: Vec<String>, records: Vec<Vec<Cell>>) -> DatasetResult<Self> {
        let mut dataset = Self::new();
        for column in &columns {
            dataset.ensure_column(column);
        }

        for record in records {
            if record.len() != columns.len() {
                return Err(DatasetError::LengthMismatch {
                    column: format!("row {}", dataset.rows.len()),
                    expected: columns.len(),
                    actual: record.len(),
                });
            }
            let mut row = Row::default();
            for (column, cell) in columns.iter().zip(record) {
                row.set(column, cell);
            }
            dataset.rows.push(row);
        }

        Ok(dataset)
    }

    /// Convert rows back to JSON objects, one key per column.
    pub fn to_documents(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).to_json()))
                    .collect();
                Value::Object(object)
            })
            .collect()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Vec<Cow<'_, Cell>> {
        self.rows.iter().map(|r| r.get(name)).collect()
    }

    /// Register a column name without touching rows.
    pub fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }

    /// Replace (or append) a whole column.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> DatasetResult<()> {
        if values.len() != self.rows.len() {
            return Err(DatasetError::LengthMismatch {
                column: name.to_string(),
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        self.ensure_column(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.set(name, value);
        }
        Ok(())
    }

    /// Keep only rows matching the predicate, preserving order.
    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(keep);
    }

    /// Canonical text of a whole row, for exact-duplicate detection.
    pub fn row_key(&self, row: &Row) -> String {
        self.columns
            .iter()
            .map(|c| row.get(c).key())
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
