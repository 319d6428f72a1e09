//! Read-only queries over a [`RecordStore`]
//!
//! Queries use a field's index when one is registered and fall back to a scan
//! of the arena otherwise. Either way results are deterministic: records come
//! back in insertion order, and sorted views break ties by insertion order in
//! both directions. Records that lack the queried field (or hold null there)
//! are left out of sorted views, groups and range results.

use crate::error::{StoreError, StoreResult};
use crate::index::{RecordId, RecordIndex};
use crate::store::RecordStore;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tally_types::{FieldValue, Record};
use tracing::{debug, instrument, warn};

/// Query view borrowing a store
pub struct QueryEngine<'a> {
    store: &'a RecordStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    pub fn find_by_key(&self, key: &str) -> Option<Arc<Record>> {
        self.store.find_by_key(key)
    }

    /// Records whose `field` equals `value`, in insertion order
    #[instrument(skip(self))]
    pub fn find_by_field(&self, field: &str, value: &FieldValue) -> Vec<Arc<Record>> {
        let value = self.store.normalise_value(field, value);
        match self.store.index_for(field) {
            Some(index) => self.store.resolve(index.lookup(&value)),
            None => {
                debug!("No index on field; scanning");
                self.store
                    .iter()
                    .filter(|record| record.get(field) == Some(&value))
                    .cloned()
                    .collect()
            }
        }
    }

    /// Records with `min <= field <= max`, ascending by value
    pub fn find_by_range(
        &self,
        field: &str,
        min: &FieldValue,
        max: &FieldValue,
    ) -> StoreResult<Vec<Arc<Record>>> {
        self.find_by_range_with(field, min, max, true, true)
    }

    /// Range query with explicit bound inclusivity. Requires an ordered index
    /// on `field`; without one the result is empty.
    #[instrument(skip(self))]
    pub fn find_by_range_with(
        &self,
        field: &str,
        min: &FieldValue,
        max: &FieldValue,
        inclusive_min: bool,
        inclusive_max: bool,
    ) -> StoreResult<Vec<Arc<Record>>> {
        let min = self.store.normalise_value(field, min);
        let max = self.store.normalise_value(field, max);

        let Some(index) = self.store.ordered_index(field) else {
            if min > max {
                return Err(StoreError::invalid_range(field, &min, &max));
            }
            warn!(field, "Range query on a field without an ordered index");
            return Ok(Vec::new());
        };

        let ids = index.range_query(&min, &max, inclusive_min, inclusive_max)?;
        debug!(matches = ids.len(), "Range query completed");
        Ok(self.store.resolve(&ids))
    }

    /// Up to `n` records sorted by `field`. Fewer than `n` matching records
    /// yields all of them.
    #[instrument(skip(self))]
    pub fn top_n(&self, n: usize, field: &str, descending: bool) -> Vec<Arc<Record>> {
        let ids = self.ordered_ids(field, descending, Some(n));
        self.store.resolve(&ids)
    }

    /// The `n` smallest records by `field`
    pub fn bottom_n(&self, n: usize, field: &str) -> Vec<Arc<Record>> {
        self.top_n(n, field, false)
    }

    /// Every record holding `field`, sorted by it
    pub fn sorted_by(&self, field: &str, descending: bool) -> Vec<Arc<Record>> {
        let ids = self.ordered_ids(field, descending, None);
        self.store.resolve(&ids)
    }

    fn ordered_ids(&self, field: &str, descending: bool, limit: Option<usize>) -> Vec<RecordId> {
        let limit = limit.unwrap_or(usize::MAX);

        if let Some(index) = self.store.ordered_index(field) {
            return if descending {
                index.descending().flat_map(|(_, ids)| ids.iter().copied()).take(limit).collect()
            } else {
                index.ascending().flat_map(|(_, ids)| ids.iter().copied()).take(limit).collect()
            };
        }

        debug!(field, "No ordered index; sorting a scan");
        let mut entries: Vec<(RecordId, &FieldValue)> = self
            .store
            .iter_with_ids()
            .filter_map(|(id, record)| record.get_non_null(field).map(|value| (id, value)))
            .collect();

        // Stable sort keeps insertion order among equal values
        if descending {
            entries.sort_by(|a, b| b.1.cmp(a.1));
        } else {
            entries.sort_by(|a, b| a.1.cmp(b.1));
        }
        entries.into_iter().map(|(id, _)| id).take(limit).collect()
    }

    /// Records grouped by their value of `field`. Members keep insertion order.
    #[instrument(skip(self))]
    pub fn group_by(&self, field: &str) -> HashMap<FieldValue, Vec<Arc<Record>>> {
        if let Some(index) = self.store.index_for(field) {
            return index
                .buckets()
                .map(|(value, ids)| (value.clone(), self.store.resolve(ids)))
                .collect();
        }

        debug!("No index on field; grouping a scan");
        let mut groups: HashMap<FieldValue, Vec<Arc<Record>>> = HashMap::new();
        for record in self.store.iter() {
            if let Some(value) = record.get_non_null(field) {
                groups.entry(value.clone()).or_default().push(Arc::clone(record));
            }
        }
        groups
    }

    /// Records sharing every value in `fields` with at least one other record.
    /// Records missing any of the fields never count as duplicates.
    #[instrument(skip(self))]
    pub fn find_duplicates(&self, fields: &[&str]) -> Vec<Arc<Record>> {
        if fields.is_empty() {
            return Vec::new();
        }

        let mut seen: HashMap<Vec<&FieldValue>, Vec<RecordId>> = HashMap::new();
        for (id, record) in self.store.iter_with_ids() {
            let signature: Option<Vec<&FieldValue>> =
                fields.iter().map(|field| record.get_non_null(field)).collect();
            if let Some(signature) = signature {
                seen.entry(signature).or_default().push(id);
            }
        }

        let mut ids: Vec<RecordId> =
            seen.into_values().filter(|ids| ids.len() > 1).flatten().collect();
        ids.sort_unstable();
        debug!(duplicates = ids.len(), "Duplicate scan completed");
        self.store.resolve(&ids)
    }

    /// Records matching `predicate`, in insertion order
    pub fn filter(&self, predicate: impl Fn(&Record) -> bool) -> Vec<Arc<Record>> {
        self.store.iter().filter(|record| predicate(record)).cloned().collect()
    }

    /// Count records per classifier output; `None` leaves a record uncounted
    pub fn count_by<K, F>(&self, classifier: F) -> HashMap<K, usize>
    where
        K: Hash + Eq,
        F: Fn(&Record) -> Option<K>,
    {
        let mut counts = HashMap::new();
        for record in self.store.iter() {
            if let Some(key) = classifier(record) {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Smallest and largest non-null value of `field`
    pub fn value_bounds(&self, field: &str) -> Option<(FieldValue, FieldValue)> {
        if let Some(index) = self.store.ordered_index(field) {
            return index.min_value().cloned().zip(index.max_value().cloned());
        }

        let mut values = self.store.iter().filter_map(|record| record.get_non_null(field));
        let first = values.next()?;
        let (min, max) = values.fold((first, first), |(min, max), value| {
            (if value < min { value } else { min }, if value > max { value } else { max })
        });
        Some((min.clone(), max.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(key: &str, department: &str, score: f64) -> Record {
        Record::new(key).with_field("department", department).with_field("score", score)
    }

    fn indexed() -> RecordStore {
        let mut store = RecordStore::builder()
            .exact_index("department")
            .ordered_index("score")
            .build()
            .unwrap();
        for record in [
            student("S001", "math", 85.0),
            student("S002", "physics", 92.0),
            student("S003", "math", 78.0),
            student("S004", "math", 92.0),
            Record::new("S005").with_field("department", "art"),
        ] {
            store.add(record).unwrap();
        }
        store
    }

    fn unindexed() -> RecordStore {
        let indexed = indexed();
        let mut store = RecordStore::new();
        for record in indexed.records() {
            store.add(Record::clone(&record)).unwrap();
        }
        store
    }

    fn keys(records: &[Arc<Record>]) -> Vec<&str> {
        records.iter().map(|record| record.key()).collect()
    }

    #[test]
    fn test_top_n_ties_keep_insertion_order() {
        for store in [indexed(), unindexed()] {
            let query = QueryEngine::new(&store);
            assert_eq!(keys(&query.top_n(3, "score", true)), vec!["S002", "S004", "S001"]);
            assert_eq!(keys(&query.bottom_n(2, "score")), vec!["S003", "S001"]);
        }
    }

    #[test]
    fn test_top_n_returns_fewer_without_padding() {
        let store = indexed();
        let query = QueryEngine::new(&store);
        // S005 has no score and is excluded
        assert_eq!(query.top_n(10, "score", true).len(), 4);
        assert!(query.top_n(0, "score", true).is_empty());
    }

    #[test]
    fn test_range_with_and_without_index() {
        let store = indexed();
        let query = QueryEngine::new(&store);
        let hits = query
            .find_by_range("score", &FieldValue::Float(80.0), &FieldValue::Float(92.0))
            .unwrap();
        assert_eq!(keys(&hits), vec!["S001", "S002", "S004"]);

        let err = query.find_by_range("score", &FieldValue::Float(92.0), &FieldValue::Float(80.0));
        assert_eq!(err.unwrap_err().category(), "invalid_range");

        let store = unindexed();
        let query = QueryEngine::new(&store);
        let hits = query
            .find_by_range("score", &FieldValue::Float(80.0), &FieldValue::Float(92.0))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_group_by_index_matches_scan() {
        let a = indexed();
        let b = unindexed();
        let with_index = QueryEngine::new(&a).group_by("department");
        let with_scan = QueryEngine::new(&b).group_by("department");

        assert_eq!(with_index.len(), 3);
        for (value, records) in &with_index {
            assert_eq!(keys(records), keys(&with_scan[value]));
        }
        assert_eq!(keys(&with_index[&FieldValue::from("math")]), vec!["S001", "S003", "S004"]);
    }

    #[test]
    fn test_find_by_field_coerces_through_index() {
        let store = indexed();
        let query = QueryEngine::new(&store);
        let hits = query.find_by_field("score", &FieldValue::Float(92.0));
        assert_eq!(keys(&hits), vec!["S002", "S004"]);
        assert!(query.find_by_field("missing", &FieldValue::Integer(1)).is_empty());
    }

    #[test]
    fn test_mixed_integer_and_float_values_are_one_value() {
        let indexed = RecordStore::builder().ordered_index("value").build().unwrap();
        let unindexed = RecordStore::new();
        for mut store in [indexed, unindexed] {
            store.add(Record::new("D001").with_field("value", 100.0)).unwrap();
            store.add(Record::new("D002").with_field("value", 120.0)).unwrap();
            store.add(Record::new("D003").with_field("value", 100i64)).unwrap();
            let query = QueryEngine::new(&store);

            assert_eq!(keys(&query.bottom_n(3, "value")), vec!["D001", "D003", "D002"]);
            assert_eq!(keys(&query.top_n(3, "value", true)), vec!["D002", "D001", "D003"]);
            assert_eq!(
                keys(&query.find_by_field("value", &FieldValue::Integer(100))),
                vec!["D001", "D003"]
            );
            assert_eq!(query.group_by("value").len(), 2);
            assert_eq!(keys(&query.find_duplicates(&["value"])), vec!["D001", "D003"]);
        }

        let mut store = RecordStore::builder().ordered_index("value").build().unwrap();
        store.add(Record::new("D001").with_field("value", 100.0)).unwrap();
        store.add(Record::new("D002").with_field("value", 120.0)).unwrap();
        store.add(Record::new("D003").with_field("value", 100i64)).unwrap();
        let query = QueryEngine::new(&store);

        let hits = query
            .find_by_range("value", &FieldValue::Integer(100), &FieldValue::Integer(120))
            .unwrap();
        assert_eq!(keys(&hits), vec!["D001", "D003", "D002"]);

        let point = query
            .find_by_range("value", &FieldValue::Float(100.0), &FieldValue::Integer(100))
            .unwrap();
        assert_eq!(keys(&point), vec!["D001", "D003"]);
    }

    #[test]
    fn test_find_duplicates() {
        let store = indexed();
        let query = QueryEngine::new(&store);
        assert_eq!(keys(&query.find_duplicates(&["score"])), vec!["S002", "S004"]);
        assert!(query.find_duplicates(&["department", "score"]).is_empty());
        assert!(query.find_duplicates(&[]).is_empty());
    }

    #[test]
    fn test_filter_and_count_by() {
        let store = indexed();
        let query = QueryEngine::new(&store);

        let high = query.filter(|r| r.get("score").and_then(FieldValue::as_f64) > Some(90.0));
        assert_eq!(keys(&high), vec!["S002", "S004"]);

        let grades = query.count_by(|r| {
            r.get("score").and_then(FieldValue::as_f64).map(|s| if s >= 90.0 { 'A' } else { 'B' })
        });
        assert_eq!(grades[&'A'], 2);
        assert_eq!(grades[&'B'], 2);
    }

    #[test]
    fn test_value_bounds() {
        for store in [indexed(), unindexed()] {
            let bounds = QueryEngine::new(&store).value_bounds("score");
            assert_eq!(bounds, Some((FieldValue::Float(78.0), FieldValue::Float(92.0))));
        }
        assert_eq!(QueryEngine::new(&RecordStore::new()).value_bounds("score"), None);
    }
}
