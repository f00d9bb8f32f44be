//! Tab-separated flat file row source
//!
//! The first line holds the column labels. Empty cells are NULL, cells
//! with a decimal point or exponent are decimals, everything else must parse
//! as a 64-bit integer.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use bigdecimal::BigDecimal;
use tracing::debug;

use minicube_common::config::SourceConfig;
use minicube_common::error::{Error, Result, SourceError};

use super::{DateRange, RowScan, RowSource, SourceRow, SourceValue};

/// Row source reading a tab-separated file on every scan
#[derive(Debug, Clone)]
pub struct TsvRowSource {
    path: PathBuf,
    date_column: String,
}

impl TsvRowSource {
    pub fn new(path: impl AsRef<Path>, date_column: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            date_column: date_column.into(),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(&config.path, config.date_column.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowSource for TsvRowSource {
    fn scan(&self, range: &DateRange) -> Result<RowScan> {
        let file = File::open(&self.path).map_err(|e| {
            SourceError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let mut lines = BufReader::new(file).lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => {
                return Err(SourceError::Malformed {
                    line: 1,
                    reason: "missing header".to_string(),
                }
                .into())
            }
        };
        let columns: Vec<String> = header.split('\t').map(|c| c.trim().to_string()).collect();
        let date_column = columns
            .iter()
            .position(|c| *c == self.date_column)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Date column {} not in {}",
                    self.date_column,
                    self.path.display()
                ))
            })?;

        debug!("Scanning {} for dates in {}", self.path.display(), range);
        Ok(RowScan {
            columns,
            rows: Box::new(TsvRows {
                lines,
                line: 1,
                date_column,
                range: *range,
            }),
        })
    }
}

struct TsvRows {
    lines: Lines<BufReader<File>>,
    line: usize,
    date_column: usize,
    range: DateRange,
}

impl TsvRows {
    fn in_range(&self, row: &[SourceValue]) -> bool {
        match row.get(self.date_column) {
            Some(SourceValue::Int(date)) => {
                u32::try_from(*date).is_ok_and(|d| self.range.contains(d))
            }
            _ => false,
        }
    }
}

impl Iterator for TsvRows {
    type Item = Result<SourceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            let row = match parse_line(&text, self.line) {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            if self.in_range(&row) {
                return Some(Ok(SourceRow::new(self.line, row)));
            }
        }
    }
}

fn parse_line(text: &str, line: usize) -> Result<Vec<SourceValue>> {
    text.split('\t')
        .map(|cell| parse_cell(cell.trim(), line))
        .collect()
}

fn parse_cell(cell: &str, line: usize) -> Result<SourceValue> {
    if cell.is_empty() {
        return Ok(SourceValue::Null);
    }
    let malformed = |reason: String| -> Error { SourceError::Malformed { line, reason }.into() };
    if cell.contains(['.', 'e', 'E']) {
        cell.parse::<BigDecimal>()
            .map(SourceValue::Decimal)
            .map_err(|e| malformed(format!("{:?}: {}", cell, e)))
    } else {
        cell.parse::<i64>()
            .map(SourceValue::Int)
            .map_err(|e| malformed(format!("{:?}: {}", cell, e)))
    }
}
