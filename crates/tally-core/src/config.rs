//! Store configuration
//!
//! `StoreConfig` deserializes from TOML. Every setting except the schema and
//! index list has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! statistics_ttl_secs = 60
//! lock_policy = "read_write"
//!
//! [[schema]]
//! name = "value"
//! kind = "float"
//! required = true
//!
//! [[indexes]]
//! field = "value"
//! kind = "ordered"
//! ```

use crate::error::{StoreError, StoreResult};
use crate::index::IndexKind;
use crate::schema::{FieldDef, Schema};
use crate::shared::SharedStore;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How a [`SharedStore`] guards the record store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Readers share the lock, mutators take it exclusively
    #[default]
    ReadWrite,
    /// Every operation is serialized
    Exclusive,
}

impl std::str::FromStr for LockPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read_write" | "rw" => Ok(LockPolicy::ReadWrite),
            "exclusive" | "mutex" => Ok(LockPolicy::Exclusive),
            other => Err(StoreError::configuration(
                "lock_policy",
                format!("unknown lock policy '{other}', expected read_write or exclusive"),
            )),
        }
    }
}

/// One secondary index to maintain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub field: String,
    #[serde(default = "default_index_kind")]
    pub kind: IndexKind,
}

impl IndexSpec {
    pub fn new(field: impl Into<String>, kind: IndexKind) -> Self {
        Self { field: field.into(), kind }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub schema: Schema,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    /// Lifetime of memoized statistics on an unchanged store
    #[serde(default = "default_statistics_ttl_secs")]
    pub statistics_ttl_secs: u64,
    #[serde(default = "default_statistics_cache_capacity")]
    pub statistics_cache_capacity: usize,
    #[serde(default)]
    pub lock_policy: LockPolicy,
    /// Processing reports kept before the oldest is evicted
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Share of tombstoned arena slots that triggers compaction
    #[serde(default = "default_compaction_ratio")]
    pub compaction_ratio: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema: Schema::default(),
            indexes: Vec::new(),
            statistics_ttl_secs: default_statistics_ttl_secs(),
            statistics_cache_capacity: default_statistics_cache_capacity(),
            lock_policy: LockPolicy::default(),
            history_limit: default_history_limit(),
            compaction_ratio: default_compaction_ratio(),
        }
    }
}

impl StoreConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> StoreResult<Self> {
        let config: StoreConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        info!(path = %path.display(), indexes = config.indexes.len(), "Loaded store configuration");
        Ok(config)
    }

    /// Apply `TALLY_STATISTICS_TTL_SECS`, `TALLY_LOCK_POLICY` and
    /// `TALLY_HISTORY_LIMIT` on top of the loaded values
    pub fn apply_env_overrides(mut self) -> StoreResult<Self> {
        if let Ok(ttl) = std::env::var("TALLY_STATISTICS_TTL_SECS") {
            self.statistics_ttl_secs = ttl.parse().map_err(|_| {
                StoreError::configuration("statistics_ttl_secs", format!("invalid value '{ttl}'"))
            })?;
        }
        if let Ok(policy) = std::env::var("TALLY_LOCK_POLICY") {
            self.lock_policy = policy.parse()?;
        }
        if let Ok(limit) = std::env::var("TALLY_HISTORY_LIMIT") {
            self.history_limit = limit.parse().map_err(|_| {
                StoreError::configuration("history_limit", format!("invalid value '{limit}'"))
            })?;
        }
        debug!(
            lock_policy = ?self.lock_policy,
            statistics_ttl_secs = self.statistics_ttl_secs,
            "Environment overrides applied"
        );
        Ok(self)
    }

    pub fn statistics_ttl(&self) -> Duration {
        Duration::from_secs(self.statistics_ttl_secs)
    }

    /// Reject index lists and tuning values the store cannot honour
    pub fn validate(&self) -> StoreResult<()> {
        let mut seen = HashSet::new();
        for spec in &self.indexes {
            if spec.field.is_empty() {
                return Err(StoreError::configuration("indexes", "index field name is empty"));
            }
            if !seen.insert((spec.field.as_str(), spec.kind)) {
                return Err(StoreError::configuration(
                    "indexes",
                    format!("{} index on '{}' is declared twice", spec.kind, spec.field),
                ));
            }
            if !self.schema.is_empty() && self.schema.field(&spec.field).is_none() {
                return Err(StoreError::configuration(
                    "indexes",
                    format!("index on '{}' names a field the schema does not declare", spec.field),
                ));
            }
        }

        let mut names = HashSet::new();
        for def in self.schema.fields() {
            if !names.insert(def.name.as_str()) {
                return Err(StoreError::configuration(
                    "schema",
                    format!("field '{}' is declared twice", def.name),
                ));
            }
        }

        if !(self.compaction_ratio > 0.0 && self.compaction_ratio <= 1.0) {
            return Err(StoreError::configuration(
                "compaction_ratio",
                format!("must be in (0, 1], got {}", self.compaction_ratio),
            ));
        }
        Ok(())
    }
}

/// Fluent construction of a [`RecordStore`] or [`SharedStore`]
#[derive(Debug, Clone, Default)]
pub struct StoreBuilder {
    config: StoreConfig,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Declare a schema field
    pub fn field(mut self, def: FieldDef) -> Self {
        let mut fields = self.config.schema.fields().to_vec();
        fields.push(def);
        self.config.schema = Schema::new(fields);
        self
    }

    pub fn exact_index(self, field: impl Into<String>) -> Self {
        self.index(field, IndexKind::Exact)
    }

    pub fn ordered_index(self, field: impl Into<String>) -> Self {
        self.index(field, IndexKind::Ordered)
    }

    pub fn index(mut self, field: impl Into<String>, kind: IndexKind) -> Self {
        self.config.indexes.push(IndexSpec::new(field, kind));
        self
    }

    /// Zero disables statistics memoization
    pub fn statistics_ttl(mut self, ttl: Duration) -> Self {
        self.config.statistics_ttl_secs = ttl.as_secs();
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    pub fn compaction_ratio(mut self, ratio: f64) -> Self {
        self.config.compaction_ratio = ratio;
        self
    }

    pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
        self.config.lock_policy = policy;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn build(self) -> StoreResult<RecordStore> {
        RecordStore::from_config(&self.config)
    }

    /// Build a store wrapped for multi-threaded use under the configured policy
    pub fn build_shared(self) -> StoreResult<SharedStore> {
        let policy = self.config.lock_policy;
        Ok(SharedStore::new(self.build()?, policy))
    }
}

fn default_index_kind() -> IndexKind {
    IndexKind::Exact
}

fn default_statistics_ttl_secs() -> u64 {
    60
}

fn default_statistics_cache_capacity() -> usize {
    64
}

fn default_history_limit() -> usize {
    100
}

fn default_compaction_ratio() -> f64 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::FieldKind;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.statistics_ttl(), Duration::from_secs(60));
        assert_eq!(config.lock_policy, LockPolicy::ReadWrite);
        assert_eq!(config.history_limit, 100);
    }

    #[test]
    fn test_full_document() {
        let config = StoreConfig::from_toml_str(
            r#"
            statistics_ttl_secs = 5
            lock_policy = "exclusive"

            [[schema]]
            name = "category"
            kind = "string"
            required = true

            [[schema]]
            name = "value"
            kind = "float"

            [[indexes]]
            field = "category"

            [[indexes]]
            field = "value"
            kind = "ordered"
            "#,
        )
        .unwrap();

        assert_eq!(config.statistics_ttl_secs, 5);
        assert_eq!(config.lock_policy, LockPolicy::Exclusive);
        assert_eq!(config.schema.field("category").map(|def| def.required), Some(true));
        assert_eq!(
            config.indexes,
            vec![
                IndexSpec::new("category", IndexKind::Exact),
                IndexSpec::new("value", IndexKind::Ordered)
            ]
        );
    }

    #[test]
    fn test_duplicate_index_is_rejected() {
        let err = StoreBuilder::new().exact_index("category").exact_index("category").build();
        assert!(matches!(
            err,
            Err(StoreError::Configuration { setting: Some(ref s), .. }) if s == "indexes"
        ));

        // Exact and ordered on the same field is allowed
        assert!(StoreBuilder::new().exact_index("value").ordered_index("value").build().is_ok());
    }

    #[test]
    fn test_index_on_undeclared_field_is_rejected() {
        let result = StoreBuilder::new()
            .field(FieldDef::required("value", FieldKind::Float))
            .exact_index("category")
            .build();
        assert!(result.unwrap_err().to_string().contains("does not declare"));
    }

    #[test]
    fn test_compaction_ratio_bounds() {
        assert!(StoreBuilder::new().compaction_ratio(0.0).build().is_err());
        assert!(StoreBuilder::new().compaction_ratio(1.5).build().is_err());
        assert!(StoreBuilder::new().compaction_ratio(1.0).build().is_ok());
    }

    #[test]
    fn test_lock_policy_parsing() {
        assert_eq!("exclusive".parse::<LockPolicy>().unwrap(), LockPolicy::Exclusive);
        assert_eq!("read_write".parse::<LockPolicy>().unwrap(), LockPolicy::ReadWrite);
        assert_eq!("spin".parse::<LockPolicy>().unwrap_err().category(), "configuration");
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        std::fs::write(&path, "history_limit = 3\n[[indexes]]\nfield = \"value\"\n").unwrap();

        let config = StoreConfig::from_path(&path).unwrap();
        assert_eq!(config.history_limit, 3);
        assert_eq!(config.indexes, vec![IndexSpec::new("value", IndexKind::Exact)]);

        let err = StoreConfig::from_path(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_malformed_toml() {
        let err = StoreConfig::from_toml_str("lock_policy = 3").unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
