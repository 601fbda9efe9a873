//! Loading the transformed dataset.
//!
//! - Relational target: one SQLite table, replaced on every load
//! - Spreadsheet target: an xlsx workbook, one sheet with a header row
//!
//! Both targets write the dataset's columns in order. Lists are stored as
//! JSON text in SQLite and as comma-separated text in the spreadsheet.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use rust_xlsxwriter::{Workbook, Worksheet};
use std::fs;
use std::path::Path;

use crate::error::{LoadError, LoadResult};
use crate::models::{Cell, Dataset};

/// Writes datasets to the load targets and keeps one report line per write.
#[derive(Debug, Default)]
pub struct Loader {
    reports: Vec<String>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `table` in the SQLite database at `store` with the dataset.
    ///
    /// Drop, create and insert run in one transaction: on failure the
    /// previous table is left as it was. Returns the number of rows written.
    pub fn persist_relational(&mut self, dataset: &Dataset, store: &Path, table: &str) -> LoadResult<usize> {
        let table_ident = quote_table(table)?;
        if dataset.columns().is_empty() {
            return Err(LoadError::NoColumns(table.to_string()));
        }
        ensure_parent(store)?;

        let mut conn = Connection::open(store)?;
        let tx = conn.transaction()?;

        tx.execute(&format!("DROP TABLE IF EXISTS {}", table_ident), [])?;
        tx.execute(&create_table_sql(dataset, &table_ident), [])?;
        {
            let placeholders = vec!["?"; dataset.columns().len()].join(", ");
            let mut stmt = tx.prepare(&format!("INSERT INTO {} VALUES ({})", table_ident, placeholders))?;
            for row in dataset.rows() {
                let values = dataset.columns().iter().map(|c| sql_value(&row.get(c)));
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;

        self.reports.push(format!(
            "Loaded into SQLite: {} | table: {} ({} rows)",
            store.display(),
            table,
            dataset.len()
        ));
        Ok(dataset.len())
    }

    /// Write the dataset as an xlsx workbook, overwriting `file`.
    ///
    /// Numbers are written as numeric cells, nulls are left empty.
    pub fn persist_spreadsheet(&mut self, dataset: &Dataset, file: &Path) -> LoadResult<usize> {
        ensure_parent(file)?;

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (index, name) in dataset.columns().iter().enumerate() {
            let col = sheet_col(index)?;
            sheet.write_string(0, col, name)?;
            for (i, row) in dataset.rows().iter().enumerate() {
                let line = u32::try_from(i + 1).map_err(|_| LoadError::TooLarge(dataset.len()))?;
                write_cell(sheet, line, col, &row.get(name))?;
            }
        }
        workbook.save(file)?;

        self.reports.push(format!("Spreadsheet written: {} ({} rows)", file.display(), dataset.len()));
        Ok(dataset.len())
    }

    /// Whether `table` holds exactly `expected` rows.
    pub fn verify_relational(&self, store: &Path, table: &str, expected: usize) -> LoadResult<bool> {
        Ok(count_rows(store, table)? == expected)
    }

    pub fn reports(&self) -> &[String] {
        &self.reports
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("Load summary:\n");
        for line in &self.reports {
            out.push_str(&format!("  - {}\n", line));
        }
        out
    }
}

/// `SELECT COUNT(*)` on an existing database; never creates the file.
pub fn count_rows(store: &Path, table: &str) -> LoadResult<usize> {
    let table_ident = quote_table(table)?;
    let conn = Connection::open_with_flags(store, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table_ident), [], |row| row.get(0))?;
    Ok(count.max(0) as usize)
}

fn ensure_parent(path: &Path) -> LoadResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Double-quoted SQL identifier
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_table(table: &str) -> LoadResult<String> {
    if table.trim().is_empty() || table.contains('\0') {
        return Err(LoadError::InvalidTable(table.to_string()));
    }
    Ok(quote_ident(table))
}

/// Column affinity from the non-null cells of a column
fn affinity(dataset: &Dataset, column: &str) -> &'static str {
    let mut integer = true;
    let mut real = true;
    let mut any = false;

    for cell in dataset.column(column) {
        match cell.as_ref() {
            Cell::Null => continue,
            Cell::Int(_) | Cell::Bool(_) => {}
            Cell::Float(_) => integer = false,
            Cell::Text(_) | Cell::List(_) => {
                integer = false;
                real = false;
            }
        }
        any = true;
    }

    match (any, integer, real) {
        (false, _, _) => "TEXT",
        (true, true, _) => "INTEGER",
        (true, false, true) => "REAL",
        _ => "TEXT",
    }
}

fn create_table_sql(dataset: &Dataset, table_ident: &str) -> String {
    let columns: Vec<String> = dataset
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_ident(c), affinity(dataset, c)))
        .collect();
    format!("CREATE TABLE {} ({})", table_ident, columns.join(", "))
}

fn sheet_col(index: usize) -> LoadResult<u16> {
    u16::try_from(index).map_err(|_| LoadError::TooLarge(index))
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, cell: &Cell) -> LoadResult<()> {
    match cell {
        Cell::Null => {}
        Cell::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Cell::Int(i) => {
            sheet.write_number(row, col, *i as f64)?;
        }
        Cell::Float(f) => {
            sheet.write_number(row, col, *f)?;
        }
        Cell::Text(_) | Cell::List(_) => {
            sheet.write_string(row, col, cell.to_string())?;
        }
    }
    Ok(())
}

fn sql_value(cell: &Cell) -> SqlValue {
    match cell {
        Cell::Null => SqlValue::Null,
        Cell::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Cell::Int(i) => SqlValue::Integer(*i),
        Cell::Float(f) => SqlValue::Real(*f),
        Cell::Text(s) => SqlValue::Text(s.clone()),
        Cell::List(_) => SqlValue::Text(cell.to_json().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceCategory;
    use serde_json::json;
    use tempfile::tempdir;

    fn transformed() -> Dataset {
        let mut dataset = Dataset::from_documents(&[
            json!({"name": "Loft", "price": 1200.0, "amenity_wifi": 1, "last_review_date": "2019-02-16"}),
            json!({"name": "Cabin", "price": null, "amenity_wifi": 0, "last_review_date": null}),
        ])
        .unwrap();
        dataset.rows_mut()[0].amenities = Cell::List(vec!["Wifi".into(), "Kitchen".into()]);
        dataset.rows_mut()[0].price_category = Some(PriceCategory::High);
        dataset.ensure_column("amenities");
        dataset.ensure_column("price_category");
        dataset
    }

    #[test]
    fn test_persist_and_verify_relational() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("listado.db");
        let mut loader = Loader::new();

        assert_eq!(loader.persist_relational(&transformed(), &store, "listado").unwrap(), 2);
        assert!(loader.verify_relational(&store, "listado", 2).unwrap());
        assert!(!loader.verify_relational(&store, "listado", 3).unwrap());

        let conn = Connection::open(&store).unwrap();
        let (price, amenities, category): (f64, String, String) = conn
            .query_row(
                "SELECT price, amenities, price_category FROM listado WHERE name = 'Loft'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(price, 1200.0);
        assert_eq!(amenities, r#"["Wifi","Kitchen"]"#);
        assert_eq!(category, "High");

        let null_price: Option<f64> = conn
            .query_row("SELECT price FROM listado WHERE name = 'Cabin'", [], |row| row.get(0))
            .unwrap();
        assert!(null_price.is_none());
    }

    #[test]
    fn test_relational_load_replaces_table() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("out.db");
        let mut loader = Loader::new();

        loader.persist_relational(&transformed(), &store, "listado").unwrap();
        let smaller = Dataset::from_documents(&[json!({"id": 1})]).unwrap();
        loader.persist_relational(&smaller, &store, "listado").unwrap();

        assert_eq!(count_rows(&store, "listado").unwrap(), 1);
        assert_eq!(loader.reports().len(), 2);
    }

    #[test]
    fn test_column_affinity() {
        let dataset = transformed();
        let sql = create_table_sql(&dataset, "\"t\"");
        assert!(sql.contains("\"price\" REAL"));
        assert!(sql.contains("\"amenity_wifi\" INTEGER"));
        assert!(sql.contains("\"name\" TEXT"));
    }

    #[test]
    fn test_zero_rows_creates_empty_table() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("empty.db");
        let mut dataset = Dataset::new();
        dataset.ensure_column("price");

        Loader::new().persist_relational(&dataset, &store, "listado").unwrap();
        assert_eq!(count_rows(&store, "listado").unwrap(), 0);
    }

    #[test]
    fn test_invalid_targets() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("x.db");
        let mut loader = Loader::new();

        assert!(matches!(
            loader.persist_relational(&transformed(), &store, " "),
            Err(LoadError::InvalidTable(_))
        ));
        assert!(matches!(
            loader.persist_relational(&Dataset::new(), &store, "t"),
            Err(LoadError::NoColumns(_))
        ));
        // Verification never creates the database
        assert!(loader.verify_relational(&dir.path().join("missing.db"), "t", 0).is_err());
        assert!(!dir.path().join("missing.db").exists());
    }

    #[test]
    fn test_persist_spreadsheet() {
        use calamine::{open_workbook, Data, Reader, Xlsx};

        let dir = tempdir().unwrap();
        let file = dir.path().join("out").join("listado.xlsx");
        let mut loader = Loader::new();

        assert_eq!(loader.persist_spreadsheet(&transformed(), &file).unwrap(), 2);

        let mut workbook: Xlsx<_> = open_workbook(&file).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        assert_eq!(range.height(), 3);

        let headers: Vec<String> = range.rows().next().unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(headers[0], "name");
        let col = |name: &str| headers.iter().position(|h| h == name).unwrap() as u32;

        assert_eq!(range.get_value((1, col("name"))), Some(&Data::String("Loft".into())));
        assert_eq!(range.get_value((1, col("price"))), Some(&Data::Float(1200.0)));
        assert_eq!(range.get_value((1, col("amenity_wifi"))), Some(&Data::Float(1.0)));
        assert_eq!(range.get_value((1, col("amenities"))), Some(&Data::String("Wifi, Kitchen".into())));
        assert_eq!(range.get_value((1, col("price_category"))), Some(&Data::String("High".into())));

        // Nulls are empty cells
        assert!(matches!(range.get_value((2, col("price"))), None | Some(Data::Empty)));
        assert!(matches!(range.get_value((2, col("last_review_date"))), None | Some(Data::Empty)));
    }
}
