//! Inverted bitmap index over dimension values
//!
//! One roaring bitmap of row ids per `(dimension column, value)` pair. The index is
//! derived data: every write path of a fact table updates it together with the rows.

use std::collections::HashMap;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use minicube_common::types::{DimValue, RowId};

/// Bitmap index of one fact table, positional by dimension column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitmapIndex {
    columns: Vec<HashMap<DimValue, RoaringBitmap>>,
}

impl BitmapIndex {
    /// Create an empty index for `dimension_count` columns
    pub fn new(dimension_count: usize) -> Self {
        Self {
            columns: vec![HashMap::new(); dimension_count],
        }
    }

    /// Number of indexed dimension columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Append an index slot for a new dimension column
    pub(crate) fn push_column(&mut self) {
        self.columns.push(HashMap::new());
    }

    /// Mark `id` as having `value` in `column`
    pub fn insert(&mut self, column: usize, value: DimValue, id: RowId) {
        self.columns[column].entry(value).or_default().insert(id);
    }

    /// Clear `id` from the entry of `value` in `column`
    pub fn remove(&mut self, column: usize, value: DimValue, id: RowId) {
        let values = &mut self.columns[column];
        if let Some(bitmap) = values.get_mut(&value) {
            bitmap.remove(id);
            if bitmap.is_empty() {
                values.remove(&value);
            }
        }
    }

    /// Row ids having `value` in `column`
    pub fn get(&self, column: usize, value: DimValue) -> Option<&RoaringBitmap> {
        self.columns.get(column).and_then(|values| values.get(&value))
    }

    /// OR every entry of `other` into the matching entry of `self`
    pub fn union_with(&mut self, other: &BitmapIndex) {
        for (column, values) in other.columns.iter().enumerate() {
            let target = &mut self.columns[column];
            for (value, bitmap) in values {
                *target.entry(*value).or_default() |= bitmap;
            }
        }
    }

    /// Drop empty entries and release spare capacity
    pub fn compact(&mut self) {
        for values in &mut self.columns {
            values.retain(|_, bitmap| !bitmap.is_empty());
            values.shrink_to_fit();
        }
    }

    /// Number of `(column, value)` entries
    pub fn entry_count(&self) -> usize {
        self.columns.iter().map(HashMap::len).sum()
    }

    /// Serialized size of all bitmaps in bytes
    pub fn size_bytes(&self) -> usize {
        self.columns
            .iter()
            .flat_map(HashMap::values)
            .map(RoaringBitmap::serialized_size)
            .sum()
    }
}

/// Compact set of distinct 32-bit values
///
/// Values are stored by their bit pattern, so negative values round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<i32>", into = "Vec<i32>")]
pub struct DistinctSet(RoaringBitmap);

#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
impl DistinctSet {
    pub fn new() -> Self {
        Self(RoaringBitmap::new())
    }

    pub fn insert(&mut self, value: i32) -> bool {
        self.0.insert(value as u32)
    }

    pub fn contains(&self, value: i32) -> bool {
        self.0.contains(value as u32)
    }

    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.iter().map(|v| v as i32)
    }

    pub fn union_with(&mut self, other: &DistinctSet) {
        self.0 |= &other.0;
    }
}

impl FromIterator<i32> for DistinctSet {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        let mut set = DistinctSet::new();
        for v in iter {
            set.insert(v);
        }
        set
    }
}

impl From<Vec<i32>> for DistinctSet {
    fn from(values: Vec<i32>) -> Self {
        values.into_iter().collect()
    }
}

impl From<DistinctSet> for Vec<i32> {
    fn from(set: DistinctSet) -> Self {
        set.iter().collect()
    }
}
