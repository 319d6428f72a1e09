//! Error handling for store, index, query and aggregation operations
//!
//! Every condition a caller is expected to branch on (duplicate key, missing
//! key, empty aggregate, inverted range) is a variant here and is returned as
//! a value. Nothing in this crate panics on them.

use std::fmt;
use thiserror::Error;

/// Error type for Tally core operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A record with the same key is already stored
    #[error("Duplicate key: record '{key}' already exists")]
    DuplicateKey { key: String },

    /// No record with the given key is stored
    #[error("Not found: no record with key '{key}'")]
    NotFound { key: String },

    /// The record key is empty
    #[error("Invalid key: record keys must be non-empty")]
    InvalidKey,

    /// Aggregate statistics were requested over zero values
    #[error("Empty input: {operation} requires at least one value")]
    EmptyInput { operation: String, field: Option<String> },

    /// A range query whose lower bound exceeds its upper bound
    #[error("Invalid range on '{field}': min {min} is greater than max {max}")]
    InvalidRange { field: String, min: String, max: String },

    /// A record or update does not match the store schema
    #[error("Schema violation on record '{key}', field '{field}': {message}")]
    SchemaViolation { key: String, field: String, message: String },

    /// Store configuration is inconsistent
    #[error("Configuration error: {message}")]
    Configuration { message: String, setting: Option<String> },

    /// A lock guarding shared store state was poisoned by a panicking thread
    #[error("Lock poisoned during {operation}")]
    LockPoisoned { operation: String },
}

impl StoreError {
    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            StoreError::DuplicateKey { .. } => "duplicate_key",
            StoreError::NotFound { .. } => "not_found",
            StoreError::InvalidKey => "invalid_key",
            StoreError::EmptyInput { .. } => "empty_input",
            StoreError::InvalidRange { .. } => "invalid_range",
            StoreError::SchemaViolation { .. } => "schema",
            StoreError::Configuration { .. } => "configuration",
            StoreError::LockPoisoned { .. } => "lock",
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            StoreError::DuplicateKey { .. }
            | StoreError::NotFound { .. }
            | StoreError::EmptyInput { .. } => ErrorSeverity::Low,
            StoreError::InvalidKey
            | StoreError::InvalidRange { .. }
            | StoreError::SchemaViolation { .. } => ErrorSeverity::Medium,
            StoreError::Configuration { .. } => ErrorSeverity::High,
            StoreError::LockPoisoned { .. } => ErrorSeverity::Critical,
        }
    }

    /// Check if this error is recoverable. Only a poisoned lock or a bad
    /// configuration leaves the caller with nothing to retry.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StoreError::Configuration { .. } | StoreError::LockPoisoned { .. })
    }

    /// Create a duplicate key error
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    /// Create a not found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an empty input error for an aggregate operation
    pub fn empty_input(operation: &str, field: Option<&str>) -> Self {
        Self::EmptyInput { operation: operation.to_string(), field: field.map(str::to_string) }
    }

    /// Create an inverted range error
    pub fn invalid_range(field: &str, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::InvalidRange { field: field.to_string(), min: min.to_string(), max: max.to_string() }
    }

    /// Create a schema violation error
    pub fn schema(key: &str, field: &str, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            key: key.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Create a configuration error tied to one setting
    pub fn configuration(setting: &str, message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), setting: Some(setting.to_string()) }
    }

    /// Create a lock poisoning error
    pub fn lock_poisoned(operation: &str) -> Self {
        Self::LockPoisoned { operation: operation.to_string() }
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::Configuration { message: format!("TOML error: {err}"), setting: None }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Configuration {
            message: format!("I/O error reading configuration: {err}"),
            setting: None,
        }
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_conditions_are_recoverable() {
        let errors = [
            StoreError::duplicate_key("D001"),
            StoreError::not_found("D999"),
            StoreError::empty_input("statistics", Some("value")),
            StoreError::invalid_range("value", 10, 5),
        ];

        for err in errors {
            assert!(err.is_recoverable(), "{} should be recoverable", err.category());
            assert!(err.severity() <= ErrorSeverity::Medium);
        }

        assert!(!StoreError::lock_poisoned("add").is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::invalid_range("value", 150.0, 80.0);
        assert_eq!(err.to_string(), "Invalid range on 'value': min 150 is greater than max 80");

        let err = StoreError::duplicate_key("D001");
        assert!(err.to_string().contains("D001"));
        assert_eq!(err.category(), "duplicate_key");
    }

    #[test]
    fn test_toml_errors_become_configuration_errors() {
        let err: StoreError = toml::from_str::<toml::Value>("not = [valid").unwrap_err().into();
        assert_eq!(err.category(), "configuration");
        assert_eq!(err.severity(), ErrorSeverity::High);
    }
}
