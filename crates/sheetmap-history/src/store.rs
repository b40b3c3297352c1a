//! The history store abstraction and its in-memory implementation.

use std::collections::BTreeMap;

use sheetmap_model::{HistoricalRecord, HistoryKey};

use crate::error::Result;

/// Durable record of confirmed header-to-target mappings.
///
/// `load` always reflects the last successfully flushed state. `upsert`
/// only stages; nothing becomes durable until `flush` succeeds.
pub trait HistoryStore: Send + Sync {
    /// All durable records, ordered by key.
    fn load(&self) -> Result<Vec<HistoricalRecord>>;

    /// Stage a confirmation. Repeated keys fold into one staged record.
    fn upsert(&mut self, record: HistoricalRecord);

    /// Commit every staged record atomically. Returns how many keys were written.
    ///
    /// On error durable state is unchanged and the staged batch is kept.
    fn flush(&mut self) -> Result<usize>;

    /// Drop staged records without committing them.
    fn discard(&mut self);

    /// Number of staged, not yet flushed keys.
    fn staged_len(&self) -> usize;
}

/// Fold `record` into `staged`, keyed by `(normalized_header, target_table)`.
pub(crate) fn stage(staged: &mut BTreeMap<HistoryKey, HistoricalRecord>, record: HistoricalRecord) {
    match staged.get_mut(&record.key()) {
        Some(existing) => existing.absorb(&record),
        None => {
            staged.insert(record.key(), record);
        }
    }
}

/// Merge a staged batch into durable records.
pub(crate) fn merge_into(
    durable: &mut BTreeMap<HistoryKey, HistoricalRecord>,
    staged: &BTreeMap<HistoryKey, HistoricalRecord>,
) {
    for (key, record) in staged {
        match durable.get_mut(key) {
            Some(existing) => existing.absorb(record),
            None => {
                durable.insert(key.clone(), record.clone());
            }
        }
    }
}

/// History held in process memory. Useful for tests and offline sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    durable: BTreeMap<HistoryKey, HistoricalRecord>,
    staged: BTreeMap<HistoryKey, HistoricalRecord>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed durable records. Later duplicates of a key fold into earlier ones.
    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = HistoricalRecord>,
    {
        let mut durable = BTreeMap::new();
        for record in records {
            stage(&mut durable, record);
        }
        Self {
            durable,
            staged: BTreeMap::new(),
        }
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> Result<Vec<HistoricalRecord>> {
        Ok(self.durable.values().cloned().collect())
    }

    fn upsert(&mut self, record: HistoricalRecord) {
        stage(&mut self.staged, record);
    }

    fn flush(&mut self) -> Result<usize> {
        let written = self.staged.len();
        merge_into(&mut self.durable, &self.staged);
        self.staged.clear();
        Ok(written)
    }

    fn discard(&mut self) {
        self.staged.clear();
    }

    fn staged_len(&self) -> usize {
        self.staged.len()
    }
}
