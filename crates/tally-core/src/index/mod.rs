//! Field indexes over the records of a store
//!
//! An index maps one field's value to the bucket of record ids carrying that
//! value. Two flavours exist:
//!
//! - [`ExactIndex`]: hash-based, equality lookups only
//! - [`OrderedIndex`]: `BTreeMap`-based, adds range and ordered traversal
//!
//! Indexes are derived state. They never own records, only the arena slot ids
//! the store hands them, and they are mutated exclusively by the store.
//!
//! # Invariants
//!
//! - Bucket members are sorted ascending by id, which is insertion order
//! - A bucket that becomes empty is removed, never left behind

mod exact;
mod ordered;

pub use exact::ExactIndex;
pub use ordered::OrderedIndex;

use serde::{Deserialize, Serialize};
use tally_types::FieldValue;

/// Arena slot id of a stored record. Ids grow with insertion order.
pub type RecordId = u64;

/// Which index structure backs a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Equality lookups only
    Exact,
    /// Equality, range and ordered traversal
    Ordered,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Exact => write!(f, "exact"),
            IndexKind::Ordered => write!(f, "ordered"),
        }
    }
}

/// Common contract of every field index
pub trait RecordIndex {
    /// Name of the indexed field
    fn field(&self) -> &str;

    /// Add `id` to the bucket for `value`, creating the bucket if absent
    fn insert(&mut self, value: FieldValue, id: RecordId);

    /// Remove `id` from the bucket for `value`, dropping the bucket when it
    /// empties. Returns whether the id was present.
    fn remove(&mut self, value: &FieldValue, id: RecordId) -> bool;

    /// Bucket contents for `value`; empty when the value is not indexed
    fn lookup(&self, value: &FieldValue) -> &[RecordId];

    /// Drop every bucket
    fn clear(&mut self);

    /// Number of distinct indexed values
    fn bucket_count(&self) -> usize;

    /// Number of indexed record ids across all buckets
    fn entry_count(&self) -> usize;

    /// Snapshot statistics for monitoring
    fn stats(&self, kind: IndexKind) -> IndexStats {
        let distinct_values = self.bucket_count();
        let indexed_records = self.entry_count();
        IndexStats {
            field: self.field().to_string(),
            kind,
            distinct_values,
            indexed_records,
            average_records_per_value: if distinct_values == 0 {
                0.0
            } else {
                indexed_records as f64 / distinct_values as f64
            },
        }
    }
}

/// A field index of either flavour, as registered with a store
#[derive(Debug, Clone)]
pub enum FieldIndex {
    Exact(ExactIndex),
    Ordered(OrderedIndex),
}

impl FieldIndex {
    /// Create an empty index of `kind` over `field`
    pub fn new(field: impl Into<String>, kind: IndexKind) -> Self {
        match kind {
            IndexKind::Exact => FieldIndex::Exact(ExactIndex::new(field)),
            IndexKind::Ordered => FieldIndex::Ordered(OrderedIndex::new(field)),
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            FieldIndex::Exact(_) => IndexKind::Exact,
            FieldIndex::Ordered(_) => IndexKind::Ordered,
        }
    }

    /// The ordered view of this index, if it supports ranges
    pub fn as_ordered(&self) -> Option<&OrderedIndex> {
        match self {
            FieldIndex::Ordered(index) => Some(index),
            FieldIndex::Exact(_) => None,
        }
    }

    /// Distinct indexed values and their buckets, in no particular order for
    /// exact indexes and ascending order for ordered ones
    pub fn buckets(&self) -> Box<dyn Iterator<Item = (&FieldValue, &[RecordId])> + '_> {
        match self {
            FieldIndex::Exact(index) => Box::new(index.buckets()),
            FieldIndex::Ordered(index) => Box::new(index.ascending()),
        }
    }

    fn inner(&self) -> &dyn RecordIndex {
        match self {
            FieldIndex::Exact(index) => index,
            FieldIndex::Ordered(index) => index,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RecordIndex {
        match self {
            FieldIndex::Exact(index) => index,
            FieldIndex::Ordered(index) => index,
        }
    }
}

impl RecordIndex for FieldIndex {
    fn field(&self) -> &str {
        self.inner().field()
    }

    fn insert(&mut self, value: FieldValue, id: RecordId) {
        self.inner_mut().insert(value, id);
    }

    fn remove(&mut self, value: &FieldValue, id: RecordId) -> bool {
        self.inner_mut().remove(value, id)
    }

    fn lookup(&self, value: &FieldValue) -> &[RecordId] {
        self.inner().lookup(value)
    }

    fn clear(&mut self) {
        self.inner_mut().clear();
    }

    fn bucket_count(&self) -> usize {
        self.inner().bucket_count()
    }

    fn entry_count(&self) -> usize {
        self.inner().entry_count()
    }
}

/// Statistics for a single field index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub field: String,
    pub kind: IndexKind,
    pub distinct_values: usize,
    pub indexed_records: usize,
    pub average_records_per_value: f64,
}

/// Insert keeping the bucket sorted ascending; duplicates are ignored
pub(crate) fn bucket_insert(bucket: &mut Vec<RecordId>, id: RecordId) {
    match bucket.binary_search(&id) {
        Ok(_) => {}
        Err(pos) => bucket.insert(pos, id),
    }
}

/// Remove from a sorted bucket, returning whether the id was present
pub(crate) fn bucket_remove(bucket: &mut Vec<RecordId>, id: RecordId) -> bool {
    match bucket.binary_search(&id) {
        Ok(pos) => {
            bucket.remove(pos);
            true
        }
        Err(_) => false,
    }
}
