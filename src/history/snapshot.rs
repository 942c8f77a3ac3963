use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Date format used in the first column of every history file.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One appended line of a history file. `values` is aligned with the owning
/// table's columns; `None` marks an empty or unparseable cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

/// In-memory view of a history file, oldest row first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotTable {
    columns: Vec<String>,
    rows: Vec<SnapshotRow>,
}

impl SnapshotTable {
    /// Empty table with the given value columns (the `date` column is
    /// implicit).
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row in memory. Short rows are padded with missing values.
    pub fn push(&mut self, date: NaiveDate, mut values: Vec<Option<f64>>) {
        values.resize(self.columns.len(), None);
        self.rows.push(SnapshotRow { date, values });
    }

    /// Read a history file.
    ///
    /// A missing file is an empty table. Rows that cannot be read or whose
    /// date cannot be parsed are skipped; cells that are not valid UTF-8 or
    /// not numeric become missing values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "history file absent, treating as empty");
            return Ok(Self::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to open history file {}", path.display()))?;

        let headers = reader
            .byte_headers()
            .with_context(|| format!("failed to read header of {}", path.display()))?
            .clone();

        let columns: Vec<String> = headers
            .iter()
            .skip(1)
            .map(|h| String::from_utf8_lossy(h).trim().to_string())
            .collect();
        let mut table = Self::new(columns);

        for (line, record) in reader.byte_records().enumerate() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %path.display(), line = line + 2, error = %e, "skipping unreadable row");
                    continue;
                }
            };

            let raw_date = record.get(0).and_then(cell_str).unwrap_or("");
            let date = match NaiveDate::parse_from_str(raw_date, DATE_FORMAT) {
                Ok(d) => d,
                Err(e) => {
                    warn!(path = %path.display(), line = line + 2, raw_date, error = %e, "skipping row with bad date");
                    continue;
                }
            };

            let values = (1..=table.columns.len())
                .map(|i| {
                    record
                        .get(i)
                        .and_then(cell_str)
                        .and_then(|cell| cell.parse::<f64>().ok())
                })
                .collect();

            table.push(date, values);
        }

        debug!(path = %path.display(), rows = table.len(), columns = table.columns.len(), "history loaded");
        Ok(table)
    }

    #[cfg(test)]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[cfg(test)]
    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[cfg(test)]
    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Most recent value of `column`, if present.
    #[cfg(test)]
    pub fn latest(&self, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.last()?.values[idx]
    }

    /// Fractional change of `column` between the last row and the row
    /// `lookback` positions earlier: `(last - base) / base`.
    ///
    /// Returns `None` when there are not more than `lookback` rows, the column
    /// is unknown, either cell is missing, the base is zero, or the result is
    /// not finite.
    pub fn pct_change(&self, column: &str, lookback: usize) -> Option<f64> {
        if self.rows.len() <= lookback {
            return None;
        }
        let idx = self.column_index(column)?;
        let last = self.rows.len() - 1;
        let now = self.rows[last].values[idx]?;
        let base = self.rows[last - lookback].values[idx]?;
        if base == 0.0 {
            return None;
        }
        let change = (now - base) / base;
        change.is_finite().then_some(change)
    }
}

/// Trimmed UTF-8 view of a raw cell.
fn cell_str(raw: &[u8]) -> Option<&str> {
    std::str::from_utf8(raw).ok().map(str::trim)
}

// ---------------------------------------------------------------------------
// Appending
// ---------------------------------------------------------------------------

/// Append one dated row to the history file at `path`.
///
/// When the file does not exist yet (or is empty) it is created with the
/// header `date,<columns...>`. Otherwise the row follows the existing header
/// order: columns without a value are left empty, and values for columns the
/// header does not know are dropped with a warning. Existing bytes are never
/// rewritten.
pub fn append_snapshot(
    path: impl AsRef<Path>,
    date: NaiveDate,
    columns: &[String],
    values: &BTreeMap<String, f64>,
) -> Result<()> {
    let path = path.as_ref();
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let header: Vec<String> = if is_new {
        columns.to_vec()
    } else {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open history file {}", path.display()))?;
        reader
            .headers()
            .with_context(|| format!("failed to read header of {}", path.display()))?
            .iter()
            .skip(1)
            .map(|h| h.trim().to_string())
            .collect()
    };

    for key in values.keys() {
        if !header.contains(key) {
            warn!(path = %path.display(), column = %key, "value has no column in history header, dropped");
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {} for append", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);

    if is_new {
        let mut head = vec!["date".to_string()];
        head.extend(header.iter().cloned());
        writer
            .write_record(&head)
            .with_context(|| format!("failed to write header to {}", path.display()))?;
    }

    let mut record = vec![date.format(DATE_FORMAT).to_string()];
    record.extend(
        header
            .iter()
            .map(|col| values.get(col).map(|v| v.to_string()).unwrap_or_default()),
    );
    writer
        .write_record(&record)
        .with_context(|| format!("failed to append row to {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;

    debug!(path = %path.display(), %date, filled = values.len(), "snapshot appended");
    Ok(())
}
