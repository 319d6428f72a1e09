//! Time-bounded LRU cache for computed aggregates
//!
//! Entries expire after a fixed time-to-live and the least recently used entry
//! is evicted once the cache is full. The store empties the cache on every
//! mutation, so the TTL only bounds how long an unchanged store serves a
//! memoized result.

use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_access: usize,
}

/// LRU cache whose entries also expire after `ttl`
#[derive(Debug)]
pub struct TtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    map: HashMap<K, CacheEntry<V>>,
    access_counter: usize,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    /// A zero capacity or zero TTL disables caching.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            map: HashMap::with_capacity(capacity),
            access_counter: 0,
            hits: 0,
            misses: 0,
            invalidations: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live value, updating its access time
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Get a value as of `now`; an expired entry is dropped and counts as a miss
    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        let expired = match self.map.get(key) {
            Some(entry) => now.saturating_duration_since(entry.inserted_at) >= self.ttl,
            None => {
                self.misses += 1;
                return None;
            }
        };

        if expired {
            self.map.remove(key);
            self.misses += 1;
            return None;
        }

        self.access_counter += 1;
        let access = self.access_counter;
        self.hits += 1;
        self.map.get_mut(key).map(|entry| {
            entry.last_access = access;
            entry.value.clone()
        })
    }

    /// Insert a value stamped with the current time
    pub fn put(&mut self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    /// Insert a value stamped with `now`, evicting the least recently used
    /// entry if the cache is full
    pub fn put_at(&mut self, key: K, value: V, now: Instant) {
        if self.capacity == 0 || self.ttl.is_zero() {
            return;
        }

        self.access_counter += 1;

        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            self.evict_lru();
        }

        self.map.insert(
            key,
            CacheEntry { value, inserted_at: now, last_access: self.access_counter },
        );
    }

    /// Drop every entry regardless of remaining TTL
    pub fn invalidate_all(&mut self) {
        if !self.map.is_empty() {
            self.invalidations += 1;
        }
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.capacity,
            size: self.map.len(),
            ttl_secs: self.ttl.as_secs_f64(),
            hits: self.hits,
            misses: self.misses,
            invalidations: self.invalidations,
        }
    }

    fn evict_lru(&mut self) {
        let lru_key = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());

        if let Some(key) = lru_key {
            self.map.remove(&key);
        }
    }
}

/// Cache statistics for monitoring and debugging
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub size: usize,
    pub ttl_secs: f64,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, as a percentage
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 { 0.0 } else { (self.hits as f64 / lookups as f64) * 100.0 }
    }
}
