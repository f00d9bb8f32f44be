//! Cube engine: aggregation over one fact table

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive, Zero};
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use tracing::{debug, info};

use minicube_common::error::{Error, Result};
use minicube_common::metrics::{self, LatencyTimer};
use minicube_common::types::{DimValue, ExecutionMode};

use crate::columnar::FactTable;
use crate::filter::{DimFilter, ResolvedFilter};
use crate::index::DistinctSet;
use crate::parallel::fold_rows;

/// Fractional digits of every decimal the engine returns
pub const INDICATOR_SCALE: i64 = 8;

/// Aggregation engine owning one fact table
///
/// Readers take a snapshot of the table under a brief read lock and run without
/// holding it. `merge` swaps in the merged table under the write lock, so every
/// query sees the whole table either before or after a merge.
pub struct CubeEngine {
    table: RwLock<Arc<FactTable>>,
    parallel: AtomicBool,
}

impl CubeEngine {
    pub fn new(table: FactTable, mode: ExecutionMode) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
            parallel: AtomicBool::new(mode.is_parallel()),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        ExecutionMode::from_parallel(self.parallel.load(Ordering::Acquire))
    }

    /// Switch the execution mode of every later query
    pub fn set_mode(&self, mode: ExecutionMode) {
        let previous = self.parallel.swap(mode.is_parallel(), Ordering::AcqRel);
        if previous != mode.is_parallel() {
            info!("Cube {} execution mode set to {:?}", self.snapshot().name(), mode);
        }
    }

    /// Current table contents
    pub fn snapshot(&self) -> Arc<FactTable> {
        Arc::clone(&self.table.read())
    }

    /// Fold another fact table into this one
    pub fn merge(&self, other: &FactTable) -> Result<()> {
        let mut guard = self.table.write();
        Arc::make_mut(&mut *guard).merge(other)?;
        info!(
            "Merged {} rows into cube {}, now {} rows",
            other.len(),
            guard.name(),
            guard.len()
        );
        Ok(())
    }

    /// Row ids matching `filter`
    ///
    /// Fails with `NotFound` when the filter names a column the table does not have.
    pub fn filter(&self, filter: &DimFilter) -> Result<RoaringBitmap> {
        let table = self.snapshot();
        let resolved = ResolvedFilter::resolve(&table, Some(filter))?;
        Ok(resolved.candidates(&table))
    }

    /// Sum of `indicator` over the matching rows
    pub fn sum(&self, indicator: &str, filter: Option<&DimFilter>) -> Result<BigDecimal> {
        self.run("sum", || {
            let table = self.snapshot();
            let column = table.schema().indicator_index(indicator)?;
            let positions = Self::matching_positions(&table, filter)?;

            let total = fold_rows(
                self.mode(),
                &positions,
                BigDecimal::zero,
                |mut acc, position| {
                    acc += table.indicator_at(column, position);
                    Ok(acc)
                },
                |a, b| a + b,
            )?;

            let result = round_indicator(&total);
            debug!(
                "Sum {} filter {:?} over {} rows of {}: {}",
                indicator,
                filter,
                positions.len(),
                table.name(),
                result
            );
            Ok(result)
        })
    }

    /// Sum of `indicator` over the matching rows, partitioned by `group_by`
    pub fn group_sum(
        &self,
        indicator: &str,
        group_by: &str,
        filter: Option<&DimFilter>,
    ) -> Result<HashMap<DimValue, BigDecimal>> {
        self.run("group_sum", || {
            let table = self.snapshot();
            let column = table.schema().indicator_index(indicator)?;
            let group = table.schema().dimension_index(group_by)?;
            let positions = Self::matching_positions(&table, filter)?;

            let sums = fold_rows(
                self.mode(),
                &positions,
                HashMap::new,
                |mut acc: HashMap<DimValue, BigDecimal>, position| {
                    *acc.entry(table.dimension_at(group, position))
                        .or_insert_with(BigDecimal::zero) += table.indicator_at(column, position);
                    Ok(acc)
                },
                merge_sums,
            )?;

            debug!(
                "Group sum {} by {} over {} rows of {}: {} groups",
                indicator,
                group_by,
                positions.len(),
                table.name(),
                sums.len()
            );
            Ok(sums
                .into_iter()
                .map(|(key, value)| (key, round_indicator(&value)))
                .collect())
        })
    }

    /// Distinct values of `target` per `group_by` value over the matching rows
    ///
    /// An indicator target is truncated toward zero and must fit in 32 bits.
    pub fn distinct(
        &self,
        target: &str,
        target_is_dimension: bool,
        group_by: &str,
        filter: Option<&DimFilter>,
    ) -> Result<HashMap<DimValue, DistinctSet>> {
        self.run("distinct", || {
            let table = self.snapshot();
            self.distinct_sets(&table, target, target_is_dimension, group_by, filter)
        })
    }

    /// Cardinality of each per-group set returned by [`CubeEngine::distinct`]
    pub fn distinct_count(
        &self,
        target: &str,
        target_is_dimension: bool,
        group_by: &str,
        filter: Option<&DimFilter>,
    ) -> Result<HashMap<DimValue, u64>> {
        self.run("distinct_count", || {
            let table = self.snapshot();
            let sets = self.distinct_sets(&table, target, target_is_dimension, group_by, filter)?;
            Ok(sets
                .into_iter()
                .map(|(key, set)| (key, set.len()))
                .collect())
        })
    }

    fn distinct_sets(
        &self,
        table: &FactTable,
        target: &str,
        target_is_dimension: bool,
        group_by: &str,
        filter: Option<&DimFilter>,
    ) -> Result<HashMap<DimValue, DistinctSet>> {
        let target_column = if target_is_dimension {
            table.schema().dimension_index(target)?
        } else {
            table.schema().indicator_index(target)?
        };
        let group = table.schema().dimension_index(group_by)?;
        let positions = Self::matching_positions(table, filter)?;

        let read_target = |position: usize| -> Result<DimValue> {
            if target_is_dimension {
                Ok(table.dimension_at(target_column, position))
            } else {
                truncate_indicator(table.indicator_at(target_column, position))
            }
        };

        fold_rows(
            self.mode(),
            &positions,
            HashMap::new,
            |mut acc: HashMap<DimValue, DistinctSet>, position| {
                let value = read_target(position)?;
                acc.entry(table.dimension_at(group, position))
                    .or_default()
                    .insert(value);
                Ok(acc)
            },
            merge_distinct,
        )
    }

    /// Bitmap pruning followed by the exact per-row check
    fn matching_positions(table: &FactTable, filter: Option<&DimFilter>) -> Result<Vec<usize>> {
        let resolved = ResolvedFilter::resolve(table, filter)?;
        let candidates = resolved.candidates(table);
        let positions: Vec<usize> = candidates
            .iter()
            .filter_map(|id| table.position(id))
            .filter(|position| resolved.matches(table, *position))
            .collect();
        metrics::record_rows_scanned(positions.len() as u64);
        Ok(positions)
    }

    fn run<T>(&self, query_type: &str, query: impl FnOnce() -> Result<T>) -> Result<T> {
        let _timer = LatencyTimer::new(query_type);
        let result = query();
        metrics::record_query(query_type, result.is_ok());
        result
    }
}

/// Round a sum to the engine's output scale, half up
pub fn round_indicator(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(INDICATOR_SCALE, RoundingMode::HalfUp)
}

fn truncate_indicator(value: &BigDecimal) -> Result<DimValue> {
    value
        .with_scale_round(0, RoundingMode::Down)
        .to_i64()
        .and_then(|v| DimValue::try_from(v).ok())
        .ok_or_else(|| {
            Error::InvalidArgument(format!("Indicator value {} does not fit a distinct value", value))
        })
}

fn merge_sums(
    mut a: HashMap<DimValue, BigDecimal>,
    b: HashMap<DimValue, BigDecimal>,
) -> HashMap<DimValue, BigDecimal> {
    for (key, value) in b {
        *a.entry(key).or_insert_with(BigDecimal::zero) += value;
    }
    a
}

fn merge_distinct(
    mut a: HashMap<DimValue, DistinctSet>,
    b: HashMap<DimValue, DistinctSet>,
) -> HashMap<DimValue, DistinctSet> {
    for (key, set) in b {
        a.entry(key).or_default().union_with(&set);
    }
    a
}
