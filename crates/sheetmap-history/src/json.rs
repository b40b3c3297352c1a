//! JSON file-backed history store.
//!
//! Layout:
//!
//! ```json
//! {"version": 1, "records": [{"normalized_header": "...", "target_table": "...", ...}]}
//! ```
//!
//! Fields this release does not know about, at document or record level,
//! survive a rewrite untouched.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sheetmap_model::{HistoricalRecord, HistoryKey};
use tracing::{debug, info, warn};

use crate::error::{HistoryError, Result};
use crate::store::{HistoryStore, stage};

/// Current on-disk document version.
pub const HISTORY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(flatten)]
    record: HistoricalRecord,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryDocument {
    version: u32,
    #[serde(default)]
    records: Vec<StoredRecord>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl HistoryDocument {
    fn empty() -> Self {
        Self {
            version: HISTORY_FORMAT_VERSION,
            records: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// History persisted as a single JSON document.
#[derive(Debug)]
pub struct JsonHistoryStore {
    path: PathBuf,
    staged: BTreeMap<HistoryKey, HistoricalRecord>,
}

impl JsonHistoryStore {
    /// Open a store at `path`. The file is created on first flush.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staged: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<HistoryDocument> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "history file absent, starting empty");
                return Ok(HistoryDocument::empty());
            }
            Err(source) => {
                return Err(HistoryError::Io {
                    operation: "read",
                    path: self.path.clone(),
                    source,
                });
            }
        };
        parse_document(&bytes, &self.path)
    }

    fn write_document(&self, document: &HistoryDocument) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|source| HistoryError::Serialization { source })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
                operation: "create directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let result = write_temp(&temp_path, &bytes).and_then(|()| {
            fs::rename(&temp_path, &self.path).map_err(|source| HistoryError::AtomicWriteFailed {
                temp_path: temp_path.clone(),
                target_path: self.path.clone(),
                source,
            })
        });
        if result.is_err() {
            // Best effort; the target file was never touched.
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}

fn write_temp(temp_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(temp_path).map_err(|source| HistoryError::Io {
        operation: "create",
        path: temp_path.to_path_buf(),
        source,
    })?;
    file.write_all(bytes).map_err(|source| HistoryError::Io {
        operation: "write",
        path: temp_path.to_path_buf(),
        source,
    })?;
    file.sync_all().map_err(|source| HistoryError::Io {
        operation: "sync",
        path: temp_path.to_path_buf(),
        source,
    })
}

fn parse_document(bytes: &[u8], path: &Path) -> Result<HistoryDocument> {
    let value: Value = serde_json::from_slice(bytes).map_err(|source| {
        HistoryError::Deserialization {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let version = value
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| HistoryError::InvalidFormat {
            path: path.to_path_buf(),
            reason: "missing numeric \"version\" field".to_string(),
        })?;
    let version = u32::try_from(version).unwrap_or(u32::MAX);
    if version > HISTORY_FORMAT_VERSION {
        return Err(HistoryError::UnsupportedVersion {
            found: version,
            max_supported: HISTORY_FORMAT_VERSION,
            path: path.to_path_buf(),
        });
    }
    serde_json::from_value(value).map_err(|source| HistoryError::Deserialization {
        path: path.to_path_buf(),
        source,
    })
}

impl HistoryStore for JsonHistoryStore {
    fn load(&self) -> Result<Vec<HistoricalRecord>> {
        let document = self.read_document()?;
        let mut records: BTreeMap<HistoryKey, HistoricalRecord> = BTreeMap::new();
        for stored in document.records {
            let key = stored.record.key();
            match records.get(&key) {
                Some(existing) if existing.occurrence_count >= stored.record.occurrence_count => {
                    warn!(
                        header = %key.normalized_header,
                        table = %key.target_table,
                        "duplicate history key, keeping higher occurrence count"
                    );
                }
                _ => {
                    records.insert(key, stored.record);
                }
            }
        }
        debug!(path = %self.path.display(), record_count = records.len(), "loaded history");
        Ok(records.into_values().collect())
    }

    fn upsert(&mut self, record: HistoricalRecord) {
        stage(&mut self.staged, record);
    }

    fn flush(&mut self) -> Result<usize> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        // Re-read so writes made since our last load are not lost.
        let mut document = self.read_document()?;
        let mut by_key: BTreeMap<HistoryKey, StoredRecord> = BTreeMap::new();
        for stored in std::mem::take(&mut document.records) {
            let key = stored.record.key();
            match by_key.get(&key) {
                Some(existing) if existing.record.occurrence_count >= stored.record.occurrence_count => {}
                _ => {
                    by_key.insert(key, stored);
                }
            }
        }

        let mut created = 0usize;
        for (key, record) in &self.staged {
            match by_key.get_mut(key) {
                Some(existing) => existing.record.absorb(record),
                None => {
                    created += 1;
                    by_key.insert(
                        key.clone(),
                        StoredRecord {
                            record: record.clone(),
                            extra: Map::new(),
                        },
                    );
                }
            }
        }

        document.version = HISTORY_FORMAT_VERSION;
        document.records = by_key.into_values().collect();
        self.write_document(&document)?;

        let written = self.staged.len();
        info!(
            path = %self.path.display(),
            written,
            created,
            total = document.records.len(),
            "flushed mapping history"
        );
        self.staged.clear();
        Ok(written)
    }

    fn discard(&mut self) {
        if !self.staged.is_empty() {
            debug!(dropped = self.staged.len(), "discarding staged history");
        }
        self.staged.clear();
    }

    fn staged_len(&self) -> usize {
        self.staged.len()
    }
}
