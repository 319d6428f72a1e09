//! Thread-safe access to a [`RecordStore`]
//!
//! One `SharedStore` guards one store under the configured [`LockPolicy`].
//! A mutating call holds the lock for the whole of the mutation, index
//! maintenance included, so concurrent readers see a record either entirely
//! before or entirely after a change. Operation counters are lock-free.

use crate::aggregation::{Aggregator, ProcessingReport, Statistics};
use crate::config::LockPolicy;
use crate::error::{StoreError, StoreResult};
use crate::index::RecordId;
use crate::query::QueryEngine;
use crate::store::RecordStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tally_types::{FieldValue, Record};
use tracing::{error, instrument};

#[derive(Debug)]
enum Guarded {
    ReadWrite(RwLock<RecordStore>),
    Exclusive(Mutex<RecordStore>),
}

#[derive(Debug, Default)]
struct OperationCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    rejected_writes: AtomicU64,
}

/// Point-in-time copy of the operation counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationSnapshot {
    pub reads: u64,
    pub writes: u64,
    /// Writes whose closure returned an error
    pub rejected_writes: u64,
}

/// A record store shared between threads, usually behind an `Arc`
#[derive(Debug)]
pub struct SharedStore {
    inner: Guarded,
    counters: OperationCounters,
}

impl SharedStore {
    pub fn new(store: RecordStore, policy: LockPolicy) -> Self {
        let inner = match policy {
            LockPolicy::ReadWrite => Guarded::ReadWrite(RwLock::new(store)),
            LockPolicy::Exclusive => Guarded::Exclusive(Mutex::new(store)),
        };
        Self { inner, counters: OperationCounters::default() }
    }

    pub fn policy(&self) -> LockPolicy {
        match self.inner {
            Guarded::ReadWrite(_) => LockPolicy::ReadWrite,
            Guarded::Exclusive(_) => LockPolicy::Exclusive,
        }
    }

    /// Run `f` with shared access to the store
    pub fn read<R>(&self, f: impl FnOnce(&RecordStore) -> R) -> StoreResult<R> {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        match &self.inner {
            Guarded::ReadWrite(lock) => {
                let guard = lock.read().map_err(|_| poisoned("read"))?;
                Ok(f(&guard))
            }
            Guarded::Exclusive(lock) => {
                let guard = lock.lock().map_err(|_| poisoned("read"))?;
                Ok(f(&guard))
            }
        }
    }

    /// Run a fallible mutation with exclusive access to the store
    pub fn write<R>(
        &self,
        f: impl FnOnce(&mut RecordStore) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let result = match &self.inner {
            Guarded::ReadWrite(lock) => {
                let mut guard = lock.write().map_err(|_| poisoned("write"))?;
                f(&mut guard)
            }
            Guarded::Exclusive(lock) => {
                let mut guard = lock.lock().map_err(|_| poisoned("write"))?;
                f(&mut guard)
            }
        };

        let counter =
            if result.is_ok() { &self.counters.writes } else { &self.counters.rejected_writes };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    #[instrument(skip(self, record), fields(key = %record.key()))]
    pub fn add(&self, record: Record) -> StoreResult<RecordId> {
        self.write(|store| store.add(record))
    }

    pub fn remove(&self, key: &str) -> StoreResult<Arc<Record>> {
        self.write(|store| store.remove(key))
    }

    pub fn update_field(
        &self,
        key: &str,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> StoreResult<Option<FieldValue>> {
        let value = value.into();
        self.write(|store| store.update_field(key, field, value))
    }

    pub fn find_by_key(&self, key: &str) -> StoreResult<Option<Arc<Record>>> {
        self.read(|store| store.find_by_key(key))
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.read(RecordStore::len)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.read(RecordStore::is_empty)
    }

    pub fn top_n(&self, n: usize, field: &str, descending: bool) -> StoreResult<Vec<Arc<Record>>> {
        self.read(|store| QueryEngine::new(store).top_n(n, field, descending))
    }

    pub fn group_by(&self, field: &str) -> StoreResult<HashMap<FieldValue, Vec<Arc<Record>>>> {
        self.read(|store| QueryEngine::new(store).group_by(field))
    }

    pub fn find_by_range(
        &self,
        field: &str,
        min: &FieldValue,
        max: &FieldValue,
    ) -> StoreResult<Vec<Arc<Record>>> {
        self.read(|store| QueryEngine::new(store).find_by_range(field, min, max))?
    }

    pub fn field_statistics(&self, field: &str) -> StoreResult<Statistics> {
        self.read(|store| Aggregator::new(store).field_statistics(field))?
    }

    pub fn report(&self, field: &str) -> StoreResult<ProcessingReport> {
        self.read(|store| Aggregator::new(store).report(field))
    }

    pub fn counters(&self) -> OperationSnapshot {
        OperationSnapshot {
            reads: self.counters.reads.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            rejected_writes: self.counters.rejected_writes.load(Ordering::Relaxed),
        }
    }

    /// Unwrap the store once no other thread holds a reference
    pub fn into_inner(self) -> StoreResult<RecordStore> {
        match self.inner {
            Guarded::ReadWrite(lock) => lock.into_inner().map_err(|_| poisoned("into_inner")),
            Guarded::Exclusive(lock) => lock.into_inner().map_err(|_| poisoned("into_inner")),
        }
    }
}

fn poisoned(operation: &str) -> StoreError {
    error!(operation, "Store lock poisoned by a panicking thread");
    StoreError::lock_poisoned(operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: f64) -> Record {
        Record::new(key).with_field("value", value)
    }

    #[test]
    fn test_counters_track_outcomes() {
        for policy in [LockPolicy::ReadWrite, LockPolicy::Exclusive] {
            let shared = SharedStore::new(RecordStore::new(), policy);
            assert_eq!(shared.policy(), policy);

            shared.add(entry("D001", 100.0)).unwrap();
            assert!(shared.add(entry("D001", 1.0)).is_err());
            assert_eq!(shared.len().unwrap(), 1);

            let counters = shared.counters();
            assert_eq!(counters.writes, 1);
            assert_eq!(counters.rejected_writes, 1);
            assert_eq!(counters.reads, 1);
        }
    }

    #[test]
    fn test_poisoned_lock_is_an_error() {
        let shared = Arc::new(SharedStore::new(RecordStore::new(), LockPolicy::ReadWrite));
        let clone = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _ = clone.write(|_| -> StoreResult<()> { panic!("writer died") });
        })
        .join();

        let err = shared.len().unwrap_err();
        assert_eq!(err, StoreError::lock_poisoned("read"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_into_inner_returns_store() {
        let shared = SharedStore::new(RecordStore::new(), LockPolicy::Exclusive);
        shared.add(entry("D001", 100.0)).unwrap();
        assert_eq!(shared.into_inner().unwrap().len(), 1);
    }
}
