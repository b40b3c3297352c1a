use std::fs;

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use sheetmap_history::{HistoryError, HistoryIndex, HistoryStore, JsonHistoryStore};
use sheetmap_model::{HistoricalRecord, HistoryKey};
use tempfile::tempdir;

fn record(header: &str, table: &str, target: &str) -> HistoricalRecord {
    let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    HistoricalRecord::first_seen(HistoryKey::new(header, table), target, when)
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempdir().unwrap();
    let store = JsonHistoryStore::new(dir.path().join("history.json"));
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn flush_creates_file_and_parent_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("history.json");
    let mut store = JsonHistoryStore::new(&path);

    store.upsert(record("cust email", "customers", "email"));
    store.upsert(record("full name", "customers", "name"));
    assert!(!path.exists());

    assert_eq!(store.flush().unwrap(), 2);
    let doc: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(doc["version"], 1);
    assert_eq!(doc["records"].as_array().unwrap().len(), 2);
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn repeated_flush_increments_count_once_per_flush() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.json");
    let mut store = JsonHistoryStore::new(&path);

    for _ in 0..2 {
        store.upsert(record("cust email", "customers", "email"));
        store.flush().unwrap();
    }

    let records = JsonHistoryStore::new(&path).load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].occurrence_count, 2);
}

#[test]
fn flush_merges_with_concurrent_writer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.json");
    let mut first = JsonHistoryStore::new(&path);
    let mut second = JsonHistoryStore::new(&path);

    first.upsert(record("cust email", "customers", "email"));
    second.upsert(record("zip", "customers", "postal_code"));
    first.flush().unwrap();
    second.flush().unwrap();

    let index = HistoryIndex::new(first.load().unwrap());
    assert!(index.get("cust email", "customers").is_some());
    assert!(index.get("zip", "customers").is_some());
}

#[test]
fn unknown_fields_survive_rewrite() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.json");
    let seeded = json!({
        "version": 1,
        "owner": "ops-team",
        "records": [{
            "normalized_header": "cust email",
            "target_table": "customers",
            "target_column": "email",
            "occurrence_count": 3,
            "last_used": "2024-01-01T00:00:00Z",
            "reviewed_by": "alice"
        }]
    });
    fs::write(&path, serde_json::to_vec(&seeded).unwrap()).unwrap();

    let mut store = JsonHistoryStore::new(&path);
    store.upsert(record("cust email", "customers", "email"));
    store.flush().unwrap();

    let doc: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(doc["owner"], "ops-team");
    assert_eq!(doc["records"][0]["reviewed_by"], "alice");
    assert_eq!(doc["records"][0]["occurrence_count"], 4);
    assert_eq!(doc["records"][0]["last_used_timestamp"], "2024-03-01T12:00:00Z");
    assert!(doc["records"][0].get("last_used").is_none());
}

#[test]
fn failed_flush_leaves_file_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.json");
    let original = br#"{"version": 7, "records": []}"#;
    fs::write(&path, original).unwrap();

    let mut store = JsonHistoryStore::new(&path);
    store.upsert(record("cust email", "customers", "email"));
    let err = store.flush().unwrap_err();
    assert!(matches!(err, HistoryError::UnsupportedVersion { found: 7, .. }));
    assert_eq!(fs::read(&path).unwrap(), original);
    assert_eq!(store.staged_len(), 1);

    store.discard();
    assert_eq!(store.staged_len(), 0);
}

#[test]
fn unwritable_target_reports_atomic_failure() {
    let dir = tempdir().unwrap();
    // A directory where the file should be makes the final rename fail.
    let path = dir.path().join("history.json");
    fs::create_dir(&path).unwrap();
    fs::write(path.join("keep"), b"x").unwrap();

    let mut store = JsonHistoryStore::new(&path);
    store.upsert(record("cust email", "customers", "email"));
    let err = store.flush().unwrap_err();
    assert!(!err.user_message().is_empty());
    assert!(path.join("keep").exists());
    assert!(!path.with_extension("json.tmp").exists());
}
