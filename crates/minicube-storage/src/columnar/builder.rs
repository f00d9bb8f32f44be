//! Two-phase fact table builder
//!
//! A session is opened with [`FactTableBuilder::build`], columns are declared,
//! then each record is attached as a dimension vector and an indicator vector in
//! either order. [`FactTableBuilder::done`] consumes the session, so a builder can
//! never be reused after it closes. Dropping a builder abandons the session.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bigdecimal::BigDecimal;
use tracing::{debug, info};

use minicube_common::error::{Error, Result};
use minicube_common::metrics;
use minicube_common::types::{DimValue, RowId};

use super::FactTable;
use crate::index::BitmapIndex;
use crate::schema::Schema;

/// Computes a dimension value from a row's indicator vector
pub type DerivedFn = dyn Fn(&[BigDecimal]) -> DimValue + Send + Sync;

/// Dimension column computed from indicators instead of supplied by the loader
#[derive(Clone)]
pub struct DerivedDimension {
    name: String,
    compute: Arc<DerivedFn>,
}

impl DerivedDimension {
    pub fn new<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&[BigDecimal]) -> DimValue + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            compute: Arc::new(compute),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for DerivedDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedDimension")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct PendingRecord {
    dimensions: Option<Vec<DimValue>>,
    derived: Vec<DimValue>,
    indicators: Option<Vec<BigDecimal>>,
}

impl PendingRecord {
    fn is_complete(&self) -> bool {
        self.dimensions.is_some() && self.indicators.is_some()
    }
}

/// Open build session of one fact table
pub struct FactTableBuilder {
    name: String,
    schema: Schema,
    /// Dimension columns supplied by `add_dimension_row`, always a prefix of the schema
    supplied_dimensions: usize,
    derived: Vec<DerivedDimension>,
    records: HashMap<RowId, PendingRecord>,
    index: BitmapIndex,
    started: Instant,
}

impl FactTableBuilder {
    /// Open a build session for a fact table named `name`
    pub fn build(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("Blank fact table name".to_string()));
        }
        debug!("Opening fact table build session {}", name);
        Ok(Self {
            name,
            schema: Schema::default(),
            supplied_dimensions: 0,
            derived: Vec::new(),
            records: HashMap::new(),
            index: BitmapIndex::default(),
            started: Instant::now(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Declare dimension columns, in order
    pub fn add_dimension_columns<I>(&mut self, names: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.ensure_columns_open()?;
        if !self.derived.is_empty() {
            return Err(Error::InvalidState(
                "Dimension columns must be declared before derived dimensions".to_string(),
            ));
        }
        for name in names {
            self.schema.add_dimension(name.into())?;
            self.index.push_column();
            self.supplied_dimensions += 1;
        }
        Ok(self)
    }

    /// Declare indicator columns, in order
    pub fn add_indicator_columns<I>(&mut self, names: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.ensure_columns_open()?;
        for name in names {
            self.schema.add_indicator(name.into())?;
        }
        Ok(self)
    }

    /// Declare a dimension computed from each row's indicators
    ///
    /// Derived dimensions are appended after the supplied ones and are indexed like
    /// any other dimension once the row's indicator vector is attached.
    pub fn add_derived_dimension(&mut self, derived: DerivedDimension) -> Result<&mut Self> {
        self.ensure_columns_open()?;
        self.schema.add_dimension(derived.name.clone())?;
        self.index.push_column();
        self.derived.push(derived);
        Ok(self)
    }

    /// Attach the dimension vector of record `id`
    pub fn add_dimension_row(&mut self, id: RowId, values: Vec<DimValue>) -> Result<&mut Self> {
        if values.len() != self.supplied_dimensions {
            return Err(Error::InvalidArgument(format!(
                "Record {} has {} dimension values, expected {}",
                id,
                values.len(),
                self.supplied_dimensions
            )));
        }
        let record = self.records.entry(id).or_default();
        if record.dimensions.is_some() {
            return Err(Error::InvalidState(format!(
                "Dimension values of record {} already attached",
                id
            )));
        }
        for (column, value) in values.iter().enumerate() {
            self.index.insert(column, *value, id);
        }
        record.dimensions = Some(values);
        Ok(self)
    }

    /// Attach the indicator vector of record `id`
    pub fn add_indicator_row(&mut self, id: RowId, values: Vec<BigDecimal>) -> Result<&mut Self> {
        let expected = self.schema.indicators().len();
        if values.len() != expected {
            return Err(Error::InvalidArgument(format!(
                "Record {} has {} indicator values, expected {}",
                id,
                values.len(),
                expected
            )));
        }
        let record = self.records.entry(id).or_default();
        if record.indicators.is_some() {
            return Err(Error::InvalidState(format!(
                "Indicator values of record {} already attached",
                id
            )));
        }
        record.derived = self
            .derived
            .iter()
            .map(|derived| (derived.compute)(values.as_slice()))
            .collect();
        for (offset, value) in record.derived.iter().enumerate() {
            self.index
                .insert(self.supplied_dimensions + offset, *value, id);
        }
        record.indicators = Some(values);
        Ok(self)
    }

    /// Close the session and produce the fact table
    ///
    /// Every attached record must have both vectors. Rows are laid out in row id
    /// order so the same input always yields the same table.
    pub fn done(self) -> Result<FactTable> {
        let incomplete = self
            .records
            .values()
            .filter(|record| !record.is_complete())
            .count();
        if incomplete > 0 {
            return Err(Error::InvalidState(format!(
                "Fact table {} has {} incomplete records",
                self.name, incomplete
            )));
        }

        let Self {
            name,
            schema,
            mut records,
            mut index,
            started,
            ..
        } = self;

        let mut ids: Vec<RowId> = records.keys().copied().collect();
        ids.sort_unstable();

        let mut dimensions = vec![Vec::with_capacity(ids.len()); schema.dimensions().len()];
        let mut indicators = vec![Vec::with_capacity(ids.len()); schema.indicators().len()];
        for id in &ids {
            let Some(record) = records.remove(id) else {
                continue;
            };
            let supplied = record.dimensions.unwrap_or_default();
            for (column, value) in supplied.into_iter().chain(record.derived).enumerate() {
                dimensions[column].push(value);
            }
            for (column, value) in record
                .indicators
                .unwrap_or_default()
                .into_iter()
                .enumerate()
            {
                indicators[column].push(value);
            }
        }

        index.compact();
        let table = FactTable::from_parts(name, schema, ids, dimensions, indicators, index);

        let stats = table.stats();
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Built fact table {} with {} rows, {} index entries ({} bytes) in {} ms",
            table.name(),
            stats.rows,
            stats.index_entries,
            stats.index_bytes,
            elapsed_ms
        );
        metrics::record_build(stats.rows, stats.index_entries, elapsed_ms);

        Ok(table)
    }

    fn ensure_columns_open(&self) -> Result<()> {
        if self.records.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "Columns of {} are frozen once records are attached",
                self.name
            )))
        }
    }
}
