use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Primary key of a record. Unique within a store and never reassigned.
pub type RecordKey = String;

/// A keyed entity with named, typed fields
///
/// The key is fixed at construction. Fields are set freely while the record is
/// being built; once handed to a store, the store owns the canonical copy and
/// routes every field change through its own update path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    key: RecordKey,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Create a record with no fields
    #[must_use]
    pub fn new(key: impl Into<RecordKey>) -> Self {
        Self { key: key.into(), fields: BTreeMap::new() }
    }

    /// Builder-style field setter
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// The record's primary key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get a field value, if present
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Get a field value only when it is present and not null
    #[must_use]
    pub fn get_non_null(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    /// Check whether the record carries `field`
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// All fields in name order
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Set a field, returning the previous value
    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(name.into(), value)
    }

    /// Remove a field, returning the previous value
    pub fn remove_field(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record{{key='{}'", self.key)?;
        for (name, value) in &self.fields {
            write!(f, ", {name}={value}")?;
        }
        write!(f, "}}")
    }
}
