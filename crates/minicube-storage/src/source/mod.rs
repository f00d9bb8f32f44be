//! Row source contract and fact table loading
//!
//! A row source produces the rows of a date range together with the column
//! labels. The loader splits the columns into dimensions and indicators and
//! streams every row through a [`FactTableBuilder`].

mod memory;
mod tsv;

pub use memory::MemoryRowSource;
pub use tsv::TsvRowSource;

use std::fmt;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use minicube_common::config::SourceConfig;
use minicube_common::error::{Error, Result, SourceError};
use minicube_common::types::{DimValue, RowId};

use crate::columnar::builder::{DerivedDimension, FactTableBuilder};
use crate::columnar::FactTable;
use crate::schema::Schema;

const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Inclusive range of `yyyymmdd` dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: u32,
    pub end: u32,
}

impl DateRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Every date
    pub fn all() -> Self {
        Self {
            start: 0,
            end: u32::MAX,
        }
    }

    pub fn contains(&self, date: u32) -> bool {
        (self.start..=self.end).contains(&date)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// One cell of a source row
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Int(i64),
    Decimal(BigDecimal),
    Null,
}

impl SourceValue {
    fn into_dimension(self, column: &str) -> Result<DimValue> {
        match self {
            SourceValue::Null => Ok(Schema::UNSET_DIMENSION),
            SourceValue::Int(v) => DimValue::try_from(v).map_err(|_| {
                Error::InvalidArgument(format!("Dimension {} value {} exceeds 32 bits", column, v))
            }),
            SourceValue::Decimal(v) => {
                let whole = v.with_scale_round(0, RoundingMode::Down);
                if whole != v {
                    return Err(Error::InvalidArgument(format!(
                        "Dimension {} value {} is not an integer",
                        column, v
                    )));
                }
                whole.to_i32().ok_or_else(|| {
                    Error::InvalidArgument(format!("Dimension {} value {} exceeds 32 bits", column, v))
                })
            }
        }
    }

    fn into_indicator(self) -> BigDecimal {
        match self {
            SourceValue::Null => BigDecimal::zero(),
            SourceValue::Int(v) => BigDecimal::from(v),
            SourceValue::Decimal(v) => v,
        }
    }
}

/// One row of a scan
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// 1-based line of the row in its source, header included
    pub line: usize,
    pub values: Vec<SourceValue>,
}

impl SourceRow {
    pub fn new(line: usize, values: Vec<SourceValue>) -> Self {
        Self { line, values }
    }
}

/// Row iterator of one scan
pub type RowIter = Box<dyn Iterator<Item = Result<SourceRow>> + Send>;

/// Column labels plus the rows of one scan
pub struct RowScan {
    pub columns: Vec<String>,
    pub rows: RowIter,
}

impl fmt::Debug for RowScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowScan")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Source of truth a node rebuilds its fact table from
pub trait RowSource: Send + Sync {
    /// Rows whose date falls in `range`
    fn scan(&self, range: &DateRange) -> Result<RowScan>;
}

/// Rule splitting source columns into dimensions and indicators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSplit {
    /// Columns before this position are dimensions; unset means split by prefix
    /// (compared case-insensitively)
    pub split_index: Option<usize>,
    pub dimension_prefix: String,
}

impl ColumnSplit {
    pub fn is_dimension(&self, position: usize, label: &str) -> bool {
        match self.split_index {
            Some(index) => position < index,
            None => label
                .to_lowercase()
                .starts_with(&self.dimension_prefix.to_lowercase()),
        }
    }
}

impl Default for ColumnSplit {
    fn default() -> Self {
        Self::from(&SourceConfig::default())
    }
}

impl From<&SourceConfig> for ColumnSplit {
    fn from(config: &SourceConfig) -> Self {
        Self {
            split_index: config.split_index,
            dimension_prefix: config.dimension_prefix.clone(),
        }
    }
}

/// Build a fact table from a scan
///
/// Row ids are assigned sequentially from 1 in scan order. NULL dimension cells
/// become [`Schema::UNSET_DIMENSION`] and NULL indicator cells become zero. Any
/// row error aborts the whole build.
pub fn load_fact_table(
    name: &str,
    scan: RowScan,
    split: &ColumnSplit,
    derived: &[DerivedDimension],
) -> Result<FactTable> {
    let RowScan { columns, rows } = scan;
    let is_dimension: Vec<bool> = columns
        .iter()
        .enumerate()
        .map(|(position, label)| split.is_dimension(position, label))
        .collect();

    let mut builder = FactTableBuilder::build(name)?;
    builder
        .add_dimension_columns(labels_where(&columns, &is_dimension, true))?
        .add_indicator_columns(labels_where(&columns, &is_dimension, false))?;
    for dimension in derived {
        builder.add_derived_dimension(dimension.clone())?;
    }
    debug!(
        "Loading {} with dimensions {:?} and indicators {:?}",
        name,
        builder.schema().dimensions(),
        builder.schema().indicators()
    );

    let mut count: u64 = 0;
    for row in rows {
        let SourceRow { line, values: row } = row?;
        if row.len() != columns.len() {
            return Err(SourceError::Malformed {
                line,
                reason: format!("{} cells, expected {}", row.len(), columns.len()),
            }
            .into());
        }

        let id = RowId::try_from(count + 1)
            .map_err(|_| Error::InvalidArgument(format!("More than {} rows in {}", RowId::MAX, name)))?;
        let mut dimensions = Vec::new();
        let mut indicators = Vec::new();
        for ((value, label), dimension) in row.into_iter().zip(&columns).zip(&is_dimension) {
            if *dimension {
                dimensions.push(value.into_dimension(label)?);
            } else {
                indicators.push(value.into_indicator());
            }
        }
        builder.add_dimension_row(id, dimensions)?;
        builder.add_indicator_row(id, indicators)?;

        count += 1;
        if count % PROGRESS_INTERVAL == 0 {
            info!("Loaded {} rows into {}", count, name);
        }
    }

    builder.done()
}

fn labels_where<'a>(
    columns: &'a [String],
    is_dimension: &'a [bool],
    want: bool,
) -> impl Iterator<Item = &'a str> + 'a {
    columns
        .iter()
        .zip(is_dimension)
        .filter(move |(_, dimension)| **dimension == want)
        .map(|(label, _)| label.as_str())
}
