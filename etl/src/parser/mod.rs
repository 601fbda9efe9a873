//! CSV parser with encoding and delimiter auto-detection.
//!
//! Turns a CSV export into a [`Dataset`]: headers become columns, empty
//! fields become nulls, everything else is kept as text for the transform
//! steps to interpret.

use std::path::Path;

use crate::models::{Cell, Dataset};

/// CSV parsing error with context
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: usize,
    pub column: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => {
                write!(f, "Line {}, column '{}': {}", self.line, col, self.message)
            }
            _ => {
                write!(f, "Line {}: {}", self.line, self.message)
            }
        }
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl From<csv::Error> for CsvError {
    fn from(e: csv::Error) -> Self {
        let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
        CsvError::new(line, e.to_string())
    }
}

/// Parsed dataset with detection metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub dataset: Dataset,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes using the given encoding label.
///
/// Unknown labels fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoder = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => Some(encoding_rs::WINDOWS_1252),
        other => encoding_rs::Encoding::for_label(other.as_bytes()),
    };

    match decoder {
        Some(enc) if enc != encoding_rs::UTF_8 => enc.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting unquoted occurrences in the header line.
///
/// Defaults to `,` when none of `; , TAB |` appears.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut counts = [0usize; 4];
    let mut quoted = false;
    for ch in first_line.chars() {
        if ch == '"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(i) = separators.iter().position(|&s| s == ch) {
                counts[i] += 1;
            }
        }
    }

    separators
        .iter()
        .zip(counts)
        .fold((',', 0), |best, (&sep, count)| if count > best.1 { (sep, count) } else { best })
        .0
}

fn to_cell(field: &str) -> Cell {
    if field.is_empty() {
        Cell::Null
    } else {
        Cell::Text(field.to_string())
    }
}

/// Parse CSV text with an explicit delimiter.
///
/// Short rows are padded with nulls, extra fields are ignored, blank lines
/// are skipped.
pub fn parse_str(content: &str, delimiter: char) -> Result<Dataset, CsvError> {
    parse_headers_and_rows(content, delimiter).map(|(_, dataset)| dataset)
}

fn parse_headers_and_rows(content: &str, delimiter: char) -> Result<(Vec<String>, Dataset), CsvError> {
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| CsvError::new(1, format!("Unsupported delimiter '{}'", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::new(1, "Empty CSV file"));
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let cells = (0..headers.len())
            .map(|i| record.get(i).map(to_cell).unwrap_or(Cell::Null))
            .collect();
        records.push(cells);
    }

    let dataset = Dataset::from_records(headers.clone(), records)
        .map_err(|e| CsvError::new(0, e.to_string()))?;
    Ok((headers, dataset))
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> Result<ParseResult, CsvError> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let (headers, dataset) = parse_headers_and_rows(&content, delimiter)?;

    Ok(ParseResult {
        dataset,
        encoding,
        delimiter,
        headers,
    })
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> Result<ParseResult, CsvError> {
    let bytes = std::fs::read(path.as_ref())
        .map_err(|e| CsvError::new(0, format!("Cannot read file: {}", e)))?;

    parse_bytes_auto(&bytes)
}
