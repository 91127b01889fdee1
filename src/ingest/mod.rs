/// Readers for the study's input files.
///
/// - `gauge_csv` parses one daily CSV per gauge into per-parameter series.
/// - `storms` parses the storm table and the affected-gauge lists.

pub mod gauge_csv;
pub mod storms;

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    /// A file could not be read.
    Io { path: String, message: String },
    /// A row could not be interpreted.
    Parse { line: usize, message: String },
    /// A required column is absent from the header.
    MissingColumn(String),
    /// The file has a header but no rows.
    Empty(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Io { path, message } => write!(f, "Cannot read {}: {}", path, message),
            IngestError::Parse { line, message } => write!(f, "Parse error on line {}: {}", line, message),
            IngestError::MissingColumn(name) => write!(f, "Missing required column '{}'", name),
            IngestError::Empty(what) => write!(f, "No data rows in {}", what),
        }
    }
}

impl std::error::Error for IngestError {}

pub(crate) fn read_file(path: &std::path::Path) -> Result<String, IngestError> {
    std::fs::read_to_string(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Splits one CSV line on commas and strips surrounding whitespace and quotes.
pub(crate) fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(|f| f.trim().trim_matches('"').trim()).collect()
}
