//! Field declarations and record validation
//!
//! A schema is optional. When declared, each listed field is type-checked and
//! normalised (integers widen to floats, RFC 3339 strings become dates) before
//! a record or an update reaches the store. Undeclared fields pass through.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use tally_types::{FieldKind, FieldValue, Record};

/// Declaration of a single record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Required fields must be present and non-null
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind, required: true }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind, required: false }
    }
}

/// Declared fields of a store's records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// True when no field is declared and validation is disabled
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|def| def.name == name)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Check and normalise a record about to be inserted
    pub fn validate_record(&self, mut record: Record) -> StoreResult<Record> {
        for def in &self.fields {
            match record.get(&def.name) {
                None | Some(FieldValue::Null) if def.required => {
                    return Err(StoreError::schema(
                        record.key(),
                        &def.name,
                        "required field is missing",
                    ));
                }
                None => {}
                Some(value) => {
                    let normalised = Self::coerce(record.key(), def, value)?;
                    record.set_field(def.name.clone(), normalised);
                }
            }
        }
        Ok(record)
    }

    /// Check and normalise a single field value for an update of record `key`.
    /// `None` means the field is being removed.
    pub fn validate_update(
        &self,
        key: &str,
        field: &str,
        value: Option<&FieldValue>,
    ) -> StoreResult<Option<FieldValue>> {
        let Some(def) = self.field(field) else {
            return Ok(value.cloned());
        };

        match value {
            None | Some(FieldValue::Null) if def.required => {
                Err(StoreError::schema(key, field, "required field cannot be cleared"))
            }
            None => Ok(None),
            Some(value) => Self::coerce(key, def, value).map(Some),
        }
    }

    fn coerce(key: &str, def: &FieldDef, value: &FieldValue) -> StoreResult<FieldValue> {
        value.coerce_to(def.kind).ok_or_else(|| {
            StoreError::schema(
                key,
                &def.name,
                format!("expected {}, found {}", def.kind, value.type_name()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            FieldDef::required("category", FieldKind::String),
            FieldDef::required("value", FieldKind::Float),
            FieldDef::optional("recorded_at", FieldKind::Date),
        ])
    }

    #[test]
    fn test_valid_record_is_normalised() {
        let record = Record::new("D001")
            .with_field("category", "sales")
            .with_field("value", 100)
            .with_field("recorded_at", "2024-01-15T09:30:00Z")
            .with_field("note", "undeclared fields pass through");

        let record = schema().validate_record(record).unwrap();
        assert_eq!(record.get("value"), Some(&FieldValue::Float(100.0)));
        assert!(matches!(record.get("recorded_at"), Some(FieldValue::Date(_))));
        assert!(record.has_field("note"));
    }

    #[test]
    fn test_missing_required_field() {
        let record = Record::new("D002").with_field("category", "sales");
        let err = schema().validate_record(record).unwrap_err();
        assert!(matches!(err, StoreError::SchemaViolation { ref field, .. } if field == "value"));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let record = Record::new("D003").with_field("category", 7).with_field("value", 1.0);
        let err = schema().validate_record(record).unwrap_err();
        assert!(err.to_string().contains("expected string, found integer"));
    }

    #[test]
    fn test_update_validation() {
        let schema = schema();

        assert_eq!(
            schema.validate_update("D001", "value", Some(&FieldValue::Integer(5))).unwrap(),
            Some(FieldValue::Float(5.0))
        );
        assert!(schema.validate_update("D001", "value", None).is_err());
        assert_eq!(schema.validate_update("D001", "recorded_at", None).unwrap(), None);
        assert_eq!(
            schema.validate_update("D001", "free", Some(&FieldValue::Boolean(true))).unwrap(),
            Some(FieldValue::Boolean(true))
        );
    }

    #[test]
    fn test_empty_schema_accepts_anything() {
        let record = Record::new("X").with_field("anything", 1);
        assert_eq!(Schema::default().validate_record(record.clone()).unwrap(), record);
    }
}
