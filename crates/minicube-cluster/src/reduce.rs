//! Reduction of per-node answers into one cluster answer
//!
//! Every reduction is commutative and associative, answers arrive in any order.

use std::collections::HashMap;

use bigdecimal::{BigDecimal, Zero};

use minicube_common::types::DimValue;
use minicube_storage::{round_indicator, DistinctSet};

/// Decimal sum of node sums, at the engine's output scale
pub fn sum_decimals<I>(parts: I) -> BigDecimal
where
    I: IntoIterator<Item = BigDecimal>,
{
    let total = parts
        .into_iter()
        .fold(BigDecimal::zero(), |acc, part| acc + part);
    round_indicator(&total)
}

/// Merge group sums, adding values of identical keys
pub fn merge_group_sums<I>(parts: I) -> HashMap<DimValue, BigDecimal>
where
    I: IntoIterator<Item = HashMap<DimValue, BigDecimal>>,
{
    let mut merged: HashMap<DimValue, BigDecimal> = HashMap::new();
    for part in parts {
        for (key, value) in part {
            *merged.entry(key).or_insert_with(BigDecimal::zero) += value;
        }
    }
    merged
        .into_iter()
        .map(|(key, value)| (key, round_indicator(&value)))
        .collect()
}

/// Union distinct sets of identical keys
pub fn merge_distinct<I>(parts: I) -> HashMap<DimValue, DistinctSet>
where
    I: IntoIterator<Item = HashMap<DimValue, DistinctSet>>,
{
    let mut merged: HashMap<DimValue, DistinctSet> = HashMap::new();
    for part in parts {
        for (key, set) in part {
            merged.entry(key).or_default().union_with(&set);
        }
    }
    merged
}

/// Cardinality of every merged distinct set
pub fn count_distinct(merged: &HashMap<DimValue, DistinctSet>) -> HashMap<DimValue, u64> {
    merged.iter().map(|(key, set)| (*key, set.len())).collect()
}
