//! Dimension filters
//!
//! A filter maps dimension column names to sets of accepted values. A row
//! matches when, for every filtered column, its value is in that column's set.

use std::collections::{BTreeMap, BTreeSet};

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use minicube_common::error::{Error, Result};
use minicube_common::types::DimValue;

use crate::columnar::FactTable;

/// Dimension column name to accepted values
///
/// Serializes as a plain JSON object, e.g. `{"tradeId":[3201,3202]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimFilter(BTreeMap<String, BTreeSet<DimValue>>);

impl DimFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add accepted values for a column, keeping any already present
    #[must_use]
    pub fn with<I>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = DimValue>,
    {
        self.insert(column, values);
        self
    }

    pub fn insert<I>(&mut self, column: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = DimValue>,
    {
        self.0.entry(column.into()).or_default().extend(values);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<DimValue>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Filter bound to the column positions of one fact table
pub(crate) struct ResolvedFilter<'a> {
    clauses: Vec<(usize, &'a BTreeSet<DimValue>)>,
}

impl<'a> ResolvedFilter<'a> {
    /// Bind `filter` to `table`, failing on columns the table does not have
    pub(crate) fn resolve(table: &FactTable, filter: Option<&'a DimFilter>) -> Result<Self> {
        let mut clauses = Vec::new();
        if let Some(filter) = filter {
            for (column, values) in filter.iter() {
                let position = table.schema().find_dimension(column).ok_or_else(|| {
                    Error::NotFound(format!(
                        "Dimension column {} in filter of {}",
                        column,
                        table.name()
                    ))
                })?;
                clauses.push((position, values));
            }
        }
        Ok(Self { clauses })
    }

    /// Candidate row ids from the bitmap index
    ///
    /// Values are OR-ed within a column and the columns are AND-ed. No clauses
    /// selects every row.
    pub(crate) fn candidates(&self, table: &FactTable) -> RoaringBitmap {
        let mut result: Option<RoaringBitmap> = None;
        for (column, values) in &self.clauses {
            let mut column_ids = RoaringBitmap::new();
            for value in *values {
                if let Some(ids) = table.index().get(*column, *value) {
                    column_ids |= ids;
                }
            }
            result = Some(match result {
                Some(mut acc) => {
                    acc &= column_ids;
                    acc
                }
                None => column_ids,
            });
            if result.as_ref().is_some_and(RoaringBitmap::is_empty) {
                break;
            }
        }
        result.unwrap_or_else(|| table.row_ids().clone())
    }

    /// Exact check of one row against every clause
    pub(crate) fn matches(&self, table: &FactTable, position: usize) -> bool {
        self.clauses
            .iter()
            .all(|(column, values)| values.contains(&table.dimension_at(*column, position)))
    }
}
