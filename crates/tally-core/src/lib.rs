#![deny(warnings)]
#![allow(missing_docs)]
//! Core of the Tally indexed record store.
//!
//! A [`RecordStore`] owns keyed records and keeps exact and ordered field
//! indexes consistent with them on every mutation. [`QueryEngine`] answers
//! key, field, range, top-N and grouping queries off those indexes, and
//! [`Aggregator`] computes cached statistics and processing reports.
//! [`SharedStore`] wraps a store for multi-threaded use.
//!
//! ```
//! use tally_core::{Aggregator, QueryEngine, RecordStore};
//! use tally_types::Record;
//!
//! let mut store = RecordStore::builder().exact_index("category").build()?;
//! store.add(Record::new("D001").with_field("category", "sales").with_field("value", 100.0))?;
//! store.add(Record::new("D002").with_field("category", "sales").with_field("value", 150.0))?;
//!
//! let groups = QueryEngine::new(&store).group_by("category");
//! assert_eq!(groups.len(), 1);
//! assert_eq!(Aggregator::new(&store).field_statistics("value")?.mean, 125.0);
//! # Ok::<(), tally_core::StoreError>(())
//! ```

/// Statistics, reports and report history
pub mod aggregation;
/// TTL cache for computed aggregates
pub mod cache;
/// Store configuration and builder
pub mod config;
/// Error types
pub mod error;
/// Exact and ordered field indexes
pub mod index;
/// Read-only queries
pub mod query;
/// Optional field declarations
pub mod schema;
/// Thread-safe store wrapper
pub mod shared;
/// The record store
pub mod store;

pub use aggregation::{Aggregator, ProcessingReport, Statistics, statistics};
pub use cache::CacheStats;
pub use config::{IndexSpec, LockPolicy, StoreBuilder, StoreConfig};
pub use error::{ErrorSeverity, StoreError, StoreResult};
pub use index::{FieldIndex, IndexKind, IndexStats, RecordId, RecordIndex};
pub use query::QueryEngine;
pub use schema::{FieldDef, Schema};
pub use shared::{OperationSnapshot, SharedStore};
pub use store::RecordStore;

pub use tally_types::{FieldKind, FieldValue, Record, RecordKey};
