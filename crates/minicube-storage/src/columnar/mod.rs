//! Columnar fact table
//!
//! Rows are stored column by column: one `Vec` per dimension column and one per
//! indicator column, all aligned on the same row position. Row ids map to
//! positions through `positions`; the bitmap index is kept in step with the
//! dimension columns on every write path.

pub mod builder;

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use roaring::RoaringBitmap;
use tracing::debug;

use minicube_common::error::{Error, Result};
use minicube_common::types::{DimValue, RowId};

use crate::index::BitmapIndex;
use crate::schema::Schema;

/// Immutable-once-built fact table; mutated only through [`FactTable::merge`]
#[derive(Debug, Clone)]
pub struct FactTable {
    name: String,
    schema: Arc<Schema>,
    /// Row id at each position
    ids: Vec<RowId>,
    /// Position of each row id
    positions: HashMap<RowId, usize>,
    /// Every row id of the table
    universe: RoaringBitmap,
    dimensions: Vec<Vec<DimValue>>,
    indicators: Vec<Vec<BigDecimal>>,
    index: BitmapIndex,
}

/// Row count and index footprint of a fact table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    pub rows: u64,
    pub index_entries: u64,
    pub index_bytes: u64,
}

/// Borrowed view of one row
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a FactTable,
    position: usize,
}

impl RowRef<'_> {
    pub fn id(&self) -> RowId {
        self.table.ids[self.position]
    }

    pub fn dimension(&self, column: usize) -> DimValue {
        self.table.dimensions[column][self.position]
    }

    pub fn indicator(&self, column: usize) -> &BigDecimal {
        &self.table.indicators[column][self.position]
    }
}

impl FactTable {
    pub(crate) fn from_parts(
        name: String,
        schema: Schema,
        ids: Vec<RowId>,
        dimensions: Vec<Vec<DimValue>>,
        indicators: Vec<Vec<BigDecimal>>,
        index: BitmapIndex,
    ) -> Self {
        let positions = ids.iter().enumerate().map(|(p, id)| (*id, p)).collect();
        let universe = ids.iter().copied().collect();
        Self {
            name,
            schema: Arc::new(schema),
            ids,
            positions,
            universe,
            dimensions,
            indicators,
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn index(&self) -> &BitmapIndex {
        &self.index
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Row ids of every row in the table
    pub fn row_ids(&self) -> &RoaringBitmap {
        &self.universe
    }

    /// Position of a row, if the table has it
    pub fn position(&self, id: RowId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Look up a row by id
    pub fn row(&self, id: RowId) -> Option<RowRef<'_>> {
        self.position(id).map(|position| self.row_at(position))
    }

    pub(crate) fn row_at(&self, position: usize) -> RowRef<'_> {
        RowRef {
            table: self,
            position,
        }
    }

    pub(crate) fn dimension_at(&self, column: usize, position: usize) -> DimValue {
        self.dimensions[column][position]
    }

    pub(crate) fn indicator_at(&self, column: usize, position: usize) -> &BigDecimal {
        &self.indicators[column][position]
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            rows: self.ids.len() as u64,
            index_entries: self.index.entry_count() as u64,
            index_bytes: self.index.size_bytes() as u64,
        }
    }

    /// Fold `other` into this table
    ///
    /// Rows of `other` whose id is new are appended. Rows whose id already exists
    /// overwrite the stored row (last writer wins) and their old index bits are
    /// cleared before the indexes are OR-ed together. Fails without changing
    /// anything when the two schemas differ.
    pub fn merge(&mut self, other: &FactTable) -> Result<()> {
        if self.schema.dimensions() != other.schema.dimensions()
            || self.schema.indicators() != other.schema.indicators()
        {
            return Err(Error::InvalidArgument(format!(
                "Cannot merge fact table {} into {}: schemas differ",
                other.name, self.name
            )));
        }

        let overlapping = &self.universe & &other.universe;
        for id in &overlapping {
            let Some(position) = self.position(id) else {
                continue;
            };
            for column in 0..self.dimensions.len() {
                self.index
                    .remove(column, self.dimensions[column][position], id);
            }
        }

        for (other_position, id) in other.ids.iter().copied().enumerate() {
            match self.positions.get(&id).copied() {
                Some(position) => {
                    for (column, values) in self.dimensions.iter_mut().enumerate() {
                        values[position] = other.dimensions[column][other_position];
                    }
                    for (column, values) in self.indicators.iter_mut().enumerate() {
                        values[position] = other.indicators[column][other_position].clone();
                    }
                }
                None => {
                    let position = self.ids.len();
                    self.ids.push(id);
                    self.positions.insert(id, position);
                    for (column, values) in self.dimensions.iter_mut().enumerate() {
                        values.push(other.dimensions[column][other_position]);
                    }
                    for (column, values) in self.indicators.iter_mut().enumerate() {
                        values.push(other.indicators[column][other_position].clone());
                    }
                }
            }
        }

        self.universe |= &other.universe;
        self.index.union_with(&other.index);

        debug!(
            "Merged {} rows of {} into {} ({} overwritten)",
            other.len(),
            other.name,
            self.name,
            overlapping.len()
        );
        Ok(())
    }
}
