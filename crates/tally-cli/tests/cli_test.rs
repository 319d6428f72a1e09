//! Command-level tests: records and configuration written to temp files,
//! parsed through clap, executed through `run`

use clap::Parser;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use tally_cli::{Cli, load_config, run};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    data: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("records.json");
        let records = json!([
            {"key": "D001", "fields": {"category": "sales", "value": 100.0}},
            {"key": "D002", "fields": {"category": "sales", "value": 150.0}},
            {"key": "D003", "fields": {"category": "cost", "value": 80.0}},
            {"key": "D004", "fields": {"category": "cost", "value": 120.0}},
        ]);
        fs::write(&data, records.to_string()).unwrap();
        Self { dir, data }
    }

    fn config(&self, toml: &str) -> PathBuf {
        let path = self.dir.path().join("tally.toml");
        fs::write(&path, toml).unwrap();
        path
    }

    fn run(&self, args: &[&str]) -> anyhow::Result<Value> {
        let data = self.data.to_string_lossy().to_string();
        let mut argv = vec!["tally", "--data", data.as_str()];
        argv.extend_from_slice(args);
        run(&Cli::try_parse_from(argv)?)
    }
}

fn keys(value: &Value) -> Vec<&str> {
    value.as_array().unwrap().iter().map(|r| r["key"].as_str().unwrap()).collect()
}

#[test]
fn test_get() {
    let fixture = Fixture::new();
    let record = fixture.run(&["get", "D003"]).unwrap();
    assert_eq!(record["fields"]["category"], "cost");

    let err = fixture.run(&["get", "D999"]).unwrap_err();
    assert!(err.to_string().contains("D999"));
}

#[test]
fn test_group() {
    let fixture = Fixture::new();
    let groups = fixture.run(&["group", "category"]).unwrap();
    assert_eq!(keys(&groups["sales"]), vec!["D001", "D002"]);
    assert_eq!(keys(&groups["cost"]), vec!["D003", "D004"]);
}

#[test]
fn test_range_indexes_the_field_on_demand() {
    let fixture = Fixture::new();
    let hits = fixture.run(&["range", "value", "90", "130"]).unwrap();
    assert_eq!(keys(&hits), vec!["D001", "D004"]);

    // Integer bounds from the command line match equal float values
    let hits = fixture.run(&["range", "value", "100", "120"]).unwrap();
    assert_eq!(keys(&hits), vec!["D001", "D004"]);
    let hits = fixture.run(&["range", "value", "150", "150.0"]).unwrap();
    assert_eq!(keys(&hits), vec!["D002"]);

    let err = fixture.run(&["range", "value", "130", "90"]).unwrap_err();
    assert!(err.to_string().contains("Invalid range"));
}

#[test]
fn test_top() {
    let fixture = Fixture::new();
    assert_eq!(keys(&fixture.run(&["top", "value", "-n", "2"]).unwrap()), vec!["D002", "D004"]);
    assert_eq!(
        keys(&fixture.run(&["top", "value", "-n", "1", "--ascending"]).unwrap()),
        vec!["D003"]
    );
}

#[test]
fn test_stats() {
    let fixture = Fixture::new();
    let stats = fixture.run(&["stats", "value"]).unwrap();
    assert_eq!(stats["mean"], 112.5);
    assert_eq!(stats["median"], 110.0);
    assert_eq!(stats["count"], 4);

    let grouped = fixture.run(&["stats", "value", "--group-by", "category"]).unwrap();
    assert_eq!(grouped["sales"]["mean"], 125.0);
    assert_eq!(grouped["cost"]["mean"], 100.0);
}

#[test]
fn test_duplicates() {
    let fixture = Fixture::new();
    let none = fixture.run(&["duplicates", "category", "value"]).unwrap();
    assert!(none.as_array().unwrap().is_empty());

    let by_category = fixture.run(&["duplicates", "category"]).unwrap();
    assert_eq!(keys(&by_category), vec!["D001", "D002", "D003", "D004"]);
}

#[test]
fn test_schema_from_config_is_enforced() {
    let fixture = Fixture::new();
    let config = fixture.config(
        r#"
        [[schema]]
        name = "category"
        kind = "string"
        required = true

        [[schema]]
        name = "value"
        kind = "integer"
        "#,
    );

    let err = fixture.run(&["--config", config.to_str().unwrap(), "get", "D001"]).unwrap_err();
    assert!(format!("{err:#}").contains("expected integer, found float"));
}

#[test]
fn test_config_resolution() {
    let fixture = Fixture::new();
    let config = fixture.config("statistics_ttl_secs = 5\n");
    assert_eq!(load_config(Some(&config)).unwrap().statistics_ttl_secs, 5);

    let missing = fixture.dir.path().join("absent.toml");
    assert!(load_config(Some(&missing)).is_err());
}

#[test]
fn test_malformed_records_file() {
    let fixture = Fixture::new();
    fs::write(&fixture.data, "{\"key\": \"not an array\"}").unwrap();
    let err = fixture.run(&["get", "D001"]).unwrap_err();
    assert!(err.to_string().contains("not a JSON array of records"));
}
