//! Statistics over stored records
//!
//! [`Statistics::from_values`] is the pure computation. [`Aggregator`] runs it
//! over the numeric values of a field, either across the whole store or per
//! group, and memoizes results in the store's TTL cache. Reports wrap the same
//! computations in a result type that never fails and keep a bounded history.

use crate::cache::CacheStats;
use crate::error::{StoreError, StoreResult};
use crate::query::QueryEngine;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tally_types::{FieldValue, Record};
use tracing::{debug, instrument};

/// Summary statistics of a set of numbers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population variance (divides by `count`)
    pub variance: f64,
    pub std_dev: f64,
}

impl Statistics {
    /// Compute statistics over `values`; empty input is an error
    pub fn from_values(values: &[f64]) -> StoreResult<Self> {
        if values.is_empty() {
            return Err(StoreError::empty_input("statistics", None));
        }

        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = count / 2;
        let median =
            if count % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] };

        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Ok(Self { count, sum, min, max, mean, median, variance, std_dev: variance.sqrt() })
    }

    /// Named results, as they appear in a [`ProcessingReport`]
    pub fn to_results(&self, prefix: &str) -> BTreeMap<String, f64> {
        [
            ("count", self.count as f64),
            ("sum", self.sum),
            ("min", self.min),
            ("max", self.max),
            ("mean", self.mean),
            ("median", self.median),
            ("variance", self.variance),
            ("std_dev", self.std_dev),
        ]
        .into_iter()
        .map(|(name, value)| (format!("{prefix}{name}"), value))
        .collect()
    }
}

/// Compute statistics over a plain slice of numbers
pub fn statistics(values: &[f64]) -> StoreResult<Statistics> {
    Statistics::from_values(values)
}

/// The query a cached aggregate answers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregateKey {
    Field(String),
    Group { group_field: String, value_field: String },
}

/// A memoized aggregate
#[derive(Debug, Clone)]
pub enum CachedAggregate {
    Field(Statistics),
    Grouped(HashMap<FieldValue, Statistics>),
}

/// Outcome of a report-producing operation. Failures are recorded in
/// `errors` rather than returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub operation: String,
    pub results: BTreeMap<String, f64>,
    pub errors: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessingReport {
    fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            results: BTreeMap::new(),
            errors: Vec::new(),
            processed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn result(&self, name: &str) -> Option<f64> {
        self.results.get(name).copied()
    }
}

/// Bounded, oldest-first log of processing reports
#[derive(Debug, Clone)]
pub struct ReportHistory {
    limit: usize,
    entries: VecDeque<ProcessingReport>,
}

impl ReportHistory {
    pub fn new(limit: usize) -> Self {
        Self { limit, entries: VecDeque::with_capacity(limit.min(1024)) }
    }

    pub fn push(&mut self, report: ProcessingReport) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(report);
    }

    pub fn latest(&self) -> Option<&ProcessingReport> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessingReport> {
        self.entries.iter()
    }
}

/// Read-only statistics view over a store
pub struct Aggregator<'a> {
    store: &'a RecordStore,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Statistics over the numeric values of `field` across all records.
    /// Missing and non-numeric values are skipped.
    #[instrument(skip(self))]
    pub fn field_statistics(&self, field: &str) -> StoreResult<Statistics> {
        let cache_key = AggregateKey::Field(field.to_string());
        if let Some(CachedAggregate::Field(stats)) = self.store.cache().get(&cache_key) {
            debug!("Statistics served from cache");
            return Ok(stats);
        }

        let values = numeric_values(self.store.iter().map(|record| &**record), field);
        let stats = Statistics::from_values(&values)
            .map_err(|_| StoreError::empty_input("field_statistics", Some(field)))?;

        self.store.cache().put(cache_key, CachedAggregate::Field(stats));
        debug!(count = stats.count, mean = stats.mean, "Statistics computed");
        Ok(stats)
    }

    /// Statistics of `value_field` for each distinct value of `group_field`.
    /// Groups without a single numeric value are left out; an empty result is
    /// an error.
    #[instrument(skip(self))]
    pub fn group_statistics(
        &self,
        group_field: &str,
        value_field: &str,
    ) -> StoreResult<HashMap<FieldValue, Statistics>> {
        let cache_key = AggregateKey::Group {
            group_field: group_field.to_string(),
            value_field: value_field.to_string(),
        };
        if let Some(CachedAggregate::Grouped(stats)) = self.store.cache().get(&cache_key) {
            debug!("Group statistics served from cache");
            return Ok(stats);
        }

        let groups = QueryEngine::new(self.store).group_by(group_field);
        let stats: HashMap<FieldValue, Statistics> = groups
            .into_iter()
            .filter_map(|(group, records)| {
                let values = numeric_values(records.iter().map(|record| &**record), value_field);
                Statistics::from_values(&values).ok().map(|stats| (group, stats))
            })
            .collect();

        if stats.is_empty() {
            return Err(StoreError::empty_input("group_statistics", Some(value_field)));
        }

        self.store.cache().put(cache_key, CachedAggregate::Grouped(stats.clone()));
        debug!(groups = stats.len(), "Group statistics computed");
        Ok(stats)
    }

    /// Field statistics as a report, appended to the store's history
    pub fn report(&self, field: &str) -> ProcessingReport {
        let mut report = ProcessingReport::new(format!("statistics:{field}"));
        match self.field_statistics(field) {
            Ok(stats) => report.results = stats.to_results(""),
            Err(err) => report.errors.push(err.to_string()),
        }
        self.record(report)
    }

    /// Group statistics as a report. Result names are prefixed with the group
    /// value, e.g. `sales.mean`.
    pub fn group_report(&self, group_field: &str, value_field: &str) -> ProcessingReport {
        let mut report =
            ProcessingReport::new(format!("group_statistics:{group_field}:{value_field}"));
        match self.group_statistics(group_field, value_field) {
            Ok(groups) => {
                for (group, stats) in groups {
                    report.results.extend(stats.to_results(&format!("{group}.")));
                }
            }
            Err(err) => report.errors.push(err.to_string()),
        }
        self.record(report)
    }

    fn record(&self, report: ProcessingReport) -> ProcessingReport {
        debug!(
            operation = %report.operation,
            results = report.results.len(),
            errors = report.errors.len(),
            "Processing report recorded"
        );
        self.store.history().push(report.clone());
        report
    }

    /// Every retained report, oldest first
    pub fn history(&self) -> Vec<ProcessingReport> {
        self.store.history().iter().cloned().collect()
    }

    pub fn latest_report(&self) -> Option<ProcessingReport> {
        self.store.history().latest().cloned()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.store.cache_stats()
    }
}

fn numeric_values<'r>(records: impl Iterator<Item = &'r Record>, field: &str) -> Vec<f64> {
    records.filter_map(|record| record.get(field).and_then(FieldValue::as_f64)).collect()
}
