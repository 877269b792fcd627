//! Header-delimited CSV tables.
//!
//! Every cell is kept as an optional string: cells are trimmed and an empty
//! cell becomes `None`. Typing happens later, per column, in the
//! normalizers, so one bad value never rejects a whole file.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::SourceError;

/// A single row; index with the positions from [`CsvTable::column`].
pub type Row = [Option<String>];

/// An in-memory CSV file.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    label: String,
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    lossy_rows: usize,
}

impl CsvTable {
    /// Reads a comma-delimited file with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the file cannot be opened, is not valid
    /// CSV, or has no header row.
    pub fn read(path: &Path, label: &str) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let table = Self::from_reader(BufReader::new(file), label)?;
        log::info!(
            "[{label}] Read {} rows x {} columns from {}",
            table.len(),
            table.headers.len(),
            path.display()
        );
        if table.lossy_rows > 0 {
            log::warn!(
                "[{label}] {} rows had invalid UTF-8, replaced with U+FFFD",
                table.lossy_rows
            );
        }
        Ok(table)
    }

    /// Parses CSV from any reader. Short rows are padded with nulls and
    /// extra trailing fields are dropped. Bytes that are not valid UTF-8
    /// are replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the data is not valid CSV or has no
    /// header row.
    pub fn from_reader<R: Read>(reader: R, label: &str) -> Result<Self, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|h| decode(h).trim().to_owned())
            .collect();

        if headers.iter().all(String::is_empty) {
            return Err(SourceError::EmptyHeader {
                dataset: label.to_owned(),
            });
        }

        let mut rows = Vec::new();
        let mut lossy_rows = 0;
        for result in reader.byte_records() {
            let record = result?;
            let mut lossy = false;
            let row: Vec<Option<String>> = (0..headers.len())
                .map(|i| {
                    let cell = decode(record.get(i)?);
                    lossy |= matches!(cell, Cow::Owned(_));
                    Some(cell.trim())
                        .filter(|v| !v.is_empty())
                        .map(str::to_owned)
                })
                .collect();
            if lossy {
                lossy_rows += 1;
                log::debug!(
                    "[{label}] Invalid UTF-8 in record at line {}",
                    record.position().map_or(0, csv::Position::line)
                );
            }
            rows.push(row);
        }

        Ok(Self {
            label: label.to_owned(),
            headers,
            rows,
            lossy_rows,
        })
    }

    /// Human-readable dataset label used in logs and errors.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that contained bytes that were not valid UTF-8.
    #[must_use]
    pub const fn lossy_rows(&self) -> usize {
        self.lossy_rows
    }

    /// Position of a column by exact header name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Position of a column the caller cannot proceed without.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingColumn`] if the header is absent.
    pub fn require_column(&self, name: &str) -> Result<usize, SourceError> {
        self.column(name).ok_or_else(|| SourceError::MissingColumn {
            dataset: self.label.clone(),
            column: name.to_owned(),
        })
    }

    /// Position of a column that may be absent; logs once when it is.
    #[must_use]
    pub fn optional_column(&self, name: &str) -> Option<usize> {
        let idx = self.column(name);
        if idx.is_none() {
            log::warn!(
                "[{}] Column '{name}' not present; values will be null",
                self.label
            );
        }
        idx
    }
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Reads the value at `idx`, treating an absent column as null.
#[must_use]
pub fn value(row: &Row, idx: Option<usize>) -> Option<&str> {
    row.get(idx?)?.as_deref()
}
