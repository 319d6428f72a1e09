//! The record store: canonical records plus every index over them
//!
//! `RecordStore` is the only way to change records. Each mutating method
//! updates the arena, the primary key map and every registered index before
//! returning, and clears memoized statistics. Readers get `Arc<Record>`
//! snapshots; an update copies the record on write, so a snapshot a caller
//! already holds never changes underneath it.
//!
//! # Architecture
//! - **Arena**: `Vec<Option<Arc<Record>>>`, slot id == insertion sequence
//! - **Primary map**: key -> slot id, O(1) point lookups
//! - **Field indexes**: exact or ordered, holding slot ids
//! - **Tombstones**: removal empties a slot; the arena is compacted once
//!   tombstones pass the configured ratio, renumbering slots in order

use crate::aggregation::ReportHistory;
use crate::cache::{CacheStats, TtlCache};
use crate::config::{StoreBuilder, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::index::{FieldIndex, IndexKind, IndexStats, OrderedIndex, RecordId, RecordIndex};
use crate::schema::Schema;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tally_types::{FieldValue, Record, RecordKey};
use tracing::{debug, info, instrument};

/// Arenas smaller than this are never compacted
const MIN_COMPACTION_SLOTS: usize = 32;

/// Memoized aggregate, keyed by the query that produced it
pub(crate) type AggregateCache =
    TtlCache<crate::aggregation::AggregateKey, crate::aggregation::CachedAggregate>;

/// Indexed in-memory record store
#[derive(Debug)]
pub struct RecordStore {
    schema: Schema,
    slots: Vec<Option<Arc<Record>>>,
    primary: HashMap<RecordKey, RecordId>,
    indexes: Vec<FieldIndex>,
    live: usize,
    generation: u64,
    compaction_ratio: f64,
    aggregate_cache: Mutex<AggregateCache>,
    history: Mutex<ReportHistory>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Creates a store with no schema and no secondary indexes
    pub fn new() -> Self {
        let config = StoreConfig::default();
        Self::assemble(&config)
    }

    /// Start building a store fluently
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Creates a store from a validated configuration
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let store = Self::assemble(config);
        info!(
            indexes = store.indexes.len(),
            schema_fields = store.schema.fields().len(),
            statistics_ttl_secs = config.statistics_ttl_secs,
            "Record store created"
        );
        Ok(store)
    }

    fn assemble(config: &StoreConfig) -> Self {
        let indexes =
            config.indexes.iter().map(|spec| FieldIndex::new(spec.field.clone(), spec.kind)).collect();

        Self {
            schema: config.schema.clone(),
            slots: Vec::new(),
            primary: HashMap::new(),
            indexes,
            live: 0,
            generation: 0,
            compaction_ratio: config.compaction_ratio,
            aggregate_cache: Mutex::new(TtlCache::new(
                config.statistics_cache_capacity,
                Duration::from_secs(config.statistics_ttl_secs),
            )),
            history: Mutex::new(ReportHistory::new(config.history_limit)),
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------------------------------

    /// Add a record and index it.
    ///
    /// Fails without touching the store when the key is empty, already
    /// present, or the record violates the schema.
    #[instrument(skip(self, record), fields(key = %record.key()))]
    pub fn add(&mut self, record: Record) -> StoreResult<RecordId> {
        if record.key().is_empty() {
            debug!("Rejected record with empty key");
            return Err(StoreError::InvalidKey);
        }
        if self.primary.contains_key(record.key()) {
            debug!("Rejected duplicate key");
            return Err(StoreError::duplicate_key(record.key()));
        }
        let record = self.schema.validate_record(record)?;

        let id = self.slots.len() as RecordId;
        for index in &mut self.indexes {
            if let Some(value) = record.get_non_null(index.field()) {
                index.insert(value.clone(), id);
            }
        }
        self.primary.insert(record.key().to_string(), id);
        self.slots.push(Some(Arc::new(record)));
        self.live += 1;
        self.mark_mutated();

        debug!(id, live = self.live, "Record added");
        Ok(id)
    }

    /// Remove a record from the arena and from every index, returning it
    #[instrument(skip(self))]
    pub fn remove(&mut self, key: &str) -> StoreResult<Arc<Record>> {
        let Some(id) = self.primary.remove(key) else {
            debug!("Remove of unknown key");
            return Err(StoreError::not_found(key));
        };

        let record = self
            .slots
            .get_mut(id as usize)
            .and_then(Option::take)
            .ok_or_else(|| StoreError::not_found(key))?;

        for index in &mut self.indexes {
            if let Some(value) = record.get_non_null(index.field()) {
                index.remove(value, id);
            }
        }
        self.live -= 1;
        self.mark_mutated();
        debug!(id, live = self.live, "Record removed");

        self.maybe_compact();
        Ok(record)
    }

    /// Set one field of a stored record, returning its previous value.
    ///
    /// Indexes over `field` drop the record from its old bucket before the
    /// change and pick it up in the new bucket afterwards.
    #[instrument(skip(self, value))]
    pub fn update_field(
        &mut self,
        key: &str,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> StoreResult<Option<FieldValue>> {
        self.change_field(key, field, Some(value.into()))
    }

    /// Remove one field of a stored record, returning its previous value
    #[instrument(skip(self))]
    pub fn remove_field(&mut self, key: &str, field: &str) -> StoreResult<Option<FieldValue>> {
        self.change_field(key, field, None)
    }

    fn change_field(
        &mut self,
        key: &str,
        field: &str,
        value: Option<FieldValue>,
    ) -> StoreResult<Option<FieldValue>> {
        let Some(&id) = self.primary.get(key) else {
            debug!("Update of unknown key");
            return Err(StoreError::not_found(key));
        };
        let value = self.schema.validate_update(key, field, value.as_ref())?;

        let slot = self
            .slots
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| StoreError::not_found(key))?;

        if let Some(old) = slot.get_non_null(field) {
            for index in self.indexes.iter_mut().filter(|index| index.field() == field) {
                index.remove(old, id);
            }
        }

        let record = Arc::make_mut(slot);
        let previous = match value {
            Some(value) => record.set_field(field, value),
            None => record.remove_field(field),
        };

        if let Some(new) = record.get_non_null(field) {
            for index in self.indexes.iter_mut().filter(|index| index.field() == field) {
                index.insert(new.clone(), id);
            }
        }
        self.mark_mutated();

        debug!(id, "Record field updated");
        Ok(previous)
    }

    /// Remove every record, keeping the configured indexes
    pub fn clear(&mut self) {
        self.slots.clear();
        self.primary.clear();
        for index in &mut self.indexes {
            index.clear();
        }
        self.live = 0;
        self.mark_mutated();
        debug!("Store cleared");
    }

    /// Renumber live records densely in insertion order and rebuild every index
    pub fn compact(&mut self) {
        let before = self.slots.len();
        let live: Vec<Arc<Record>> = self.slots.drain(..).flatten().collect();

        self.primary.clear();
        for index in &mut self.indexes {
            index.clear();
        }

        for (id, record) in live.into_iter().enumerate() {
            let id = id as RecordId;
            for index in &mut self.indexes {
                if let Some(value) = record.get_non_null(index.field()) {
                    index.insert(value.clone(), id);
                }
            }
            self.primary.insert(record.key().to_string(), id);
            self.slots.push(Some(record));
        }

        info!(slots_before = before, slots_after = self.slots.len(), "Arena compacted");
    }

    fn maybe_compact(&mut self) {
        let tombstones = self.slots.len() - self.live;
        if self.slots.len() >= MIN_COMPACTION_SLOTS
            && tombstones as f64 > self.slots.len() as f64 * self.compaction_ratio
        {
            self.compact();
        }
    }

    fn mark_mutated(&mut self) {
        self.generation += 1;
        self.cache().invalidate_all();
    }

    // ---------------------------------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------------------------------

    /// O(1) lookup through the primary key map
    pub fn find_by_key(&self, key: &str) -> Option<Arc<Record>> {
        self.primary.get(key).and_then(|&id| self.get(id)).cloned()
    }

    /// Current slot id of `key`. Ids change when the arena is compacted.
    pub fn id_of(&self, key: &str) -> Option<RecordId> {
        self.primary.get(key).copied()
    }

    /// Record stored in slot `id`
    pub fn get(&self, id: RecordId) -> Option<&Arc<Record>> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.primary.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of mutations applied so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Live records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.slots.iter().flatten()
    }

    /// Live records with their slot ids, in insertion order
    pub fn iter_with_ids(&self) -> impl Iterator<Item = (RecordId, &Arc<Record>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|record| (id as RecordId, record)))
    }

    /// Snapshot of every live record in insertion order
    pub fn records(&self) -> Vec<Arc<Record>> {
        self.iter().cloned().collect()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.iter().map(|record| record.key().to_string()).collect()
    }

    /// Resolve slot ids to records, skipping any that are no longer live
    pub fn resolve(&self, ids: &[RecordId]) -> Vec<Arc<Record>> {
        ids.iter().filter_map(|&id| self.get(id)).cloned().collect()
    }

    // ---------------------------------------------------------------------------------------------
    // Indexes
    // ---------------------------------------------------------------------------------------------

    pub fn indexes(&self) -> &[FieldIndex] {
        &self.indexes
    }

    /// Best index for equality lookups on `field`: exact first, then ordered
    pub fn index_for(&self, field: &str) -> Option<&FieldIndex> {
        self.index_of_kind(field, IndexKind::Exact)
            .or_else(|| self.index_of_kind(field, IndexKind::Ordered))
    }

    /// The ordered index on `field`, if one is registered
    pub fn ordered_index(&self, field: &str) -> Option<&OrderedIndex> {
        self.index_of_kind(field, IndexKind::Ordered).and_then(FieldIndex::as_ordered)
    }

    fn index_of_kind(&self, field: &str, kind: IndexKind) -> Option<&FieldIndex> {
        self.indexes.iter().find(|index| index.field() == field && index.kind() == kind)
    }

    pub fn index_stats(&self) -> Vec<IndexStats> {
        self.indexes.iter().map(|index| index.stats(index.kind())).collect()
    }

    /// Distinct non-null values of `field` in ascending order
    pub fn field_values(&self, field: &str) -> Vec<FieldValue> {
        let values: BTreeSet<FieldValue> = match self.index_for(field) {
            Some(index) => index.buckets().map(|(value, _)| value.clone()).collect(),
            None => self.iter().filter_map(|record| record.get_non_null(field).cloned()).collect(),
        };
        values.into_iter().collect()
    }

    /// Bring a query value to the declared kind of `field`, when there is one
    pub fn normalise_value(&self, field: &str, value: &FieldValue) -> FieldValue {
        self.schema
            .field(field)
            .and_then(|def| value.coerce_to(def.kind))
            .unwrap_or_else(|| value.clone())
    }

    // ---------------------------------------------------------------------------------------------
    // Aggregate cache and report history
    // ---------------------------------------------------------------------------------------------

    /// The memo is advisory, so a guard poisoned by a panicking reader is reused
    pub(crate) fn cache(&self) -> MutexGuard<'_, AggregateCache> {
        self.aggregate_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn history(&self) -> MutexGuard<'_, ReportHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }
}
