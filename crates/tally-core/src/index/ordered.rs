//! `BTreeMap`-based ordered index
//!
//! Supports everything [`super::ExactIndex`] does, plus range queries and
//! ascending/descending traversal. Iteration order is deterministic: ascending
//! by value, and by insertion order inside one bucket.

use super::{RecordId, RecordIndex, bucket_insert, bucket_remove};
use crate::error::{StoreError, StoreResult};
use std::collections::BTreeMap;
use std::ops::Bound;
use tally_types::FieldValue;

/// Ordered index: field value -> ids, sorted by value
#[derive(Debug, Clone, Default)]
pub struct OrderedIndex {
    field: String,
    tree: BTreeMap<FieldValue, Vec<RecordId>>,
}

impl OrderedIndex {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into(), tree: BTreeMap::new() }
    }

    /// Ids whose value falls between `min` and `max`, ascending by value.
    ///
    /// `min == max` with both bounds inclusive is an exact match; with either
    /// bound exclusive the range is empty. `min > max` is rejected.
    pub fn range_query(
        &self,
        min: &FieldValue,
        max: &FieldValue,
        inclusive_min: bool,
        inclusive_max: bool,
    ) -> StoreResult<Vec<RecordId>> {
        if min > max {
            return Err(StoreError::invalid_range(&self.field, min, max));
        }
        if min == max && !(inclusive_min && inclusive_max) {
            return Ok(Vec::new());
        }

        let lower = if inclusive_min { Bound::Included(min) } else { Bound::Excluded(min) };
        let upper = if inclusive_max { Bound::Included(max) } else { Bound::Excluded(max) };

        Ok(self
            .tree
            .range::<FieldValue, _>((lower, upper))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect())
    }

    /// Buckets in ascending value order
    pub fn ascending(&self) -> impl Iterator<Item = (&FieldValue, &[RecordId])> {
        self.tree.iter().map(|(value, ids)| (value, ids.as_slice()))
    }

    /// Buckets in descending value order. Ids inside each bucket stay in
    /// insertion order.
    pub fn descending(&self) -> impl Iterator<Item = (&FieldValue, &[RecordId])> {
        self.tree.iter().rev().map(|(value, ids)| (value, ids.as_slice()))
    }

    /// Smallest indexed value
    pub fn min_value(&self) -> Option<&FieldValue> {
        self.tree.keys().next()
    }

    /// Largest indexed value
    pub fn max_value(&self) -> Option<&FieldValue> {
        self.tree.keys().next_back()
    }
}

impl RecordIndex for OrderedIndex {
    fn field(&self) -> &str {
        &self.field
    }

    fn insert(&mut self, value: FieldValue, id: RecordId) {
        bucket_insert(self.tree.entry(value).or_default(), id);
    }

    fn remove(&mut self, value: &FieldValue, id: RecordId) -> bool {
        let Some(bucket) = self.tree.get_mut(value) else {
            return false;
        };

        let removed = bucket_remove(bucket, id);
        if bucket.is_empty() {
            self.tree.remove(value);
        }
        removed
    }

    fn lookup(&self, value: &FieldValue) -> &[RecordId] {
        self.tree.get(value).map(Vec::as_slice).unwrap_or_default()
    }

    fn clear(&mut self) {
        self.tree.clear();
    }

    fn bucket_count(&self) -> usize {
        self.tree.len()
    }

    fn entry_count(&self) -> usize {
        self.tree.values().map(Vec::len).sum()
    }
}
