//! In-memory row source

use parking_lot::RwLock;

use minicube_common::error::{Error, Result};

use super::{DateRange, RowScan, RowSource, SourceRow, SourceValue};

/// Row source over rows held in memory, filtered by an integer date column
#[derive(Debug)]
pub struct MemoryRowSource {
    columns: Vec<String>,
    date_column: usize,
    rows: RwLock<Vec<Vec<SourceValue>>>,
}

impl MemoryRowSource {
    pub fn new<I>(columns: I, date_column: &str) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let date_column = columns
            .iter()
            .position(|c| c == date_column)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown date column: {}", date_column)))?;
        Ok(Self {
            columns,
            date_column,
            rows: RwLock::new(Vec::new()),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Append a row; it must have one cell per column
    pub fn push(&self, row: Vec<SourceValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::InvalidArgument(format!(
                "Row has {} cells, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.write().push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl RowSource for MemoryRowSource {
    fn scan(&self, range: &DateRange) -> Result<RowScan> {
        let date_column = self.date_column;
        // Line 1 is the column labels, row i sits on line i + 2
        let rows: Vec<SourceRow> = self
            .rows
            .read()
            .iter()
            .enumerate()
            .filter(|(_, row)| match row[date_column] {
                SourceValue::Int(date) => u32::try_from(date).is_ok_and(|d| range.contains(d)),
                _ => false,
            })
            .map(|(i, row)| SourceRow::new(i + 2, row.clone()))
            .collect();
        Ok(RowScan {
            columns: self.columns.clone(),
            rows: Box::new(rows.into_iter().map(Ok)),
        })
    }
}
