//! Hash-based equality index

use super::{RecordId, RecordIndex, bucket_insert, bucket_remove};
use std::collections::HashMap;
use tally_types::FieldValue;

/// Exact-match index: field value -> ids of the records sharing that value
#[derive(Debug, Clone, Default)]
pub struct ExactIndex {
    field: String,
    buckets: HashMap<FieldValue, Vec<RecordId>>,
}

impl ExactIndex {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into(), buckets: HashMap::new() }
    }

    /// All buckets, in hash order
    pub fn buckets(&self) -> impl Iterator<Item = (&FieldValue, &[RecordId])> {
        self.buckets.iter().map(|(value, ids)| (value, ids.as_slice()))
    }
}

impl RecordIndex for ExactIndex {
    fn field(&self) -> &str {
        &self.field
    }

    fn insert(&mut self, value: FieldValue, id: RecordId) {
        bucket_insert(self.buckets.entry(value).or_default(), id);
    }

    fn remove(&mut self, value: &FieldValue, id: RecordId) -> bool {
        let Some(bucket) = self.buckets.get_mut(value) else {
            return false;
        };

        let removed = bucket_remove(bucket, id);
        if bucket.is_empty() {
            self.buckets.remove(value);
        }
        removed
    }

    fn lookup(&self, value: &FieldValue) -> &[RecordId] {
        self.buckets.get(value).map(Vec::as_slice).unwrap_or_default()
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }

    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn entry_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}
