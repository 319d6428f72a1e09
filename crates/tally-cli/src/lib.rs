//! `tally` command-line front end
//!
//! Loads records from a JSON file into a store built from the resolved
//! configuration, runs one query and returns its result as JSON. All I/O and
//! formatting lives here; the store itself never touches files.

pub mod tracing_setup;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tally_core::{
    Aggregator, IndexKind, IndexSpec, QueryEngine, RecordStore, StoreConfig, StoreError,
};
use tally_types::{FieldValue, Record};
use tracing::{debug, info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "TALLY_CONFIG_PATH";
/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "tally.toml";

#[derive(Debug, Parser)]
#[command(name = "tally")]
#[command(about = "Query and summarize keyed records with indexed lookups")]
#[command(version)]
pub struct Cli {
    /// JSON array of records: [{"key": "...", "fields": {...}}]
    #[arg(short, long)]
    pub data: PathBuf,

    /// Store configuration (TOML); defaults to $TALLY_CONFIG_PATH, then ./tally.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log filter directive, e.g. "debug" or "tally_core=debug"
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log as JSON lines on stderr
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Look up one record by key
    Get { key: String },

    /// Group records by the value of a field
    Group { field: String },

    /// Records whose field lies within [min, max]
    Range { field: String, min: String, max: String },

    /// Records with the largest (or smallest) values of a field
    Top {
        field: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        /// Smallest first instead of largest first
        #[arg(long)]
        ascending: bool,
    },

    /// Statistics over the numeric values of a field
    Stats {
        field: String,
        /// Compute statistics per distinct value of this field
        #[arg(long)]
        group_by: Option<String>,
    },

    /// Records sharing all the given field values with another record
    Duplicates {
        #[arg(required = true)]
        fields: Vec<String>,
    },
}

impl Command {
    /// Index the command needs on top of the configured ones
    fn required_index(&self) -> Option<IndexSpec> {
        match self {
            Command::Group { field } => Some(IndexSpec::new(field.clone(), IndexKind::Exact)),
            Command::Range { field, .. } | Command::Top { field, .. } => {
                Some(IndexSpec::new(field.clone(), IndexKind::Ordered))
            }
            Command::Get { .. } | Command::Stats { .. } | Command::Duplicates { .. } => None,
        }
    }
}

/// Run one command and return its JSON output
pub fn run(cli: &Cli) -> Result<Value> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(spec) = cli.command.required_index() {
        ensure_index(&mut config, spec);
    }

    let records = load_records(&cli.data)?;
    let store = build_store(&config, records)?;
    execute(&store, &cli.command)
}

/// Resolve and load the store configuration.
///
/// An explicit path must exist. Otherwise `TALLY_CONFIG_PATH` and then
/// `tally.toml` are tried, falling back to the default configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<StoreConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
    };

    if !path.exists() {
        if explicit.is_some() {
            bail!("configuration file '{}' does not exist", path.display());
        }
        warn!(
            path = %path.display(),
            "Configuration file not found. Using default configuration."
        );
        return Ok(StoreConfig::default().apply_env_overrides()?);
    }

    let config = StoreConfig::from_path(&path)
        .with_context(|| format!("failed to load configuration from '{}'", path.display()))?;
    Ok(config.apply_env_overrides()?)
}

/// Register `spec` unless an index of that kind already covers the field.
/// Fields the schema does not declare are left alone.
pub fn ensure_index(config: &mut StoreConfig, spec: IndexSpec) {
    if config.indexes.iter().any(|existing| *existing == spec) {
        return;
    }
    if !config.schema.is_empty() && config.schema.field(&spec.field).is_none() {
        return;
    }
    debug!(field = %spec.field, kind = %spec.kind, "Adding index for query");
    config.indexes.push(spec);
}

/// Read a JSON array of records
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read records from '{}'", path.display()))?;
    let records: Vec<Record> = serde_json::from_str(&source)
        .with_context(|| format!("'{}' is not a JSON array of records", path.display()))?;
    Ok(records)
}

pub fn build_store(config: &StoreConfig, records: Vec<Record>) -> Result<RecordStore> {
    let mut store = RecordStore::from_config(config)?;
    let total = records.len();
    for record in records {
        let key = record.key().to_string();
        store.add(record).with_context(|| format!("failed to load record '{key}'"))?;
    }
    info!(records = total, indexes = store.indexes().len(), "Records loaded");
    Ok(store)
}

/// Parse a command-line value: JSON scalars keep their type, anything else
/// is taken as a string
pub fn parse_value(raw: &str) -> FieldValue {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| FieldValue::try_from(&value).ok())
        .unwrap_or_else(|| FieldValue::from(raw))
}

pub fn execute(store: &RecordStore, command: &Command) -> Result<Value> {
    let query = QueryEngine::new(store);

    let output = match command {
        Command::Get { key } => match query.find_by_key(key) {
            Some(record) => to_json(&*record)?,
            None => return Err(StoreError::not_found(key.as_str()).into()),
        },
        Command::Group { field } => {
            let groups: BTreeMap<String, Vec<Record>> = query
                .group_by(field)
                .into_iter()
                .map(|(value, records)| (value.to_string(), owned(&records)))
                .collect();
            to_json(&groups)?
        }
        Command::Range { field, min, max } => {
            let hits = query.find_by_range(field, &parse_value(min), &parse_value(max))?;
            to_json(&owned(&hits))?
        }
        Command::Top { field, count, ascending } => {
            to_json(&owned(&query.top_n(*count, field, !ascending)))?
        }
        Command::Stats { field, group_by: None } => {
            to_json(&Aggregator::new(store).field_statistics(field)?)?
        }
        Command::Stats { field, group_by: Some(group_field) } => {
            let groups: BTreeMap<String, _> = Aggregator::new(store)
                .group_statistics(group_field, field)?
                .into_iter()
                .map(|(value, stats)| (value.to_string(), stats))
                .collect();
            to_json(&groups)?
        }
        Command::Duplicates { fields } => {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            to_json(&owned(&query.find_duplicates(&fields)))?
        }
    };
    Ok(output)
}

fn owned(records: &[std::sync::Arc<Record>]) -> Vec<Record> {
    records.iter().map(|record| Record::clone(record)).collect()
}

fn to_json(value: &impl Serialize) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
