use std::collections::BTreeMap;

use sheetmap_model::HistoricalRecord;

/// Read-only lookup over a snapshot of historical records.
///
/// Records are grouped by target table, then ordered by normalized header.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    tables: BTreeMap<String, BTreeMap<String, HistoricalRecord>>,
}

impl HistoryIndex {
    pub fn new<I>(records: I) -> Self
    where
        I: IntoIterator<Item = HistoricalRecord>,
    {
        let mut tables: BTreeMap<String, BTreeMap<String, HistoricalRecord>> = BTreeMap::new();
        for record in records {
            let headers = tables.entry(record.target_table.clone()).or_default();
            match headers.get_mut(&record.normalized_header) {
                // Keys are unique in a well-formed store; keep the stronger record otherwise.
                Some(existing) if existing.occurrence_count >= record.occurrence_count => {}
                _ => {
                    headers.insert(record.normalized_header.clone(), record);
                }
            }
        }
        Self { tables }
    }

    pub fn get(&self, normalized_header: &str, target_table: &str) -> Option<&HistoricalRecord> {
        self.tables
            .get(target_table)
            .and_then(|headers| headers.get(normalized_header))
    }

    /// Records for one table in lexicographic header order.
    pub fn records_for(&self, target_table: &str) -> impl Iterator<Item = &HistoricalRecord> {
        self.tables
            .get(target_table)
            .into_iter()
            .flat_map(BTreeMap::values)
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(BTreeMap::is_empty)
    }
}
