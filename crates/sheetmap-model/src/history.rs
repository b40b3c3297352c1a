//! Remembered header-to-target decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique key of a historical record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub normalized_header: String,
    pub target_table: String,
}

impl HistoryKey {
    pub fn new(normalized_header: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            normalized_header: normalized_header.into(),
            target_table: target_table.into(),
        }
    }
}

/// A confirmed mapping of a normalized header onto a target column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub normalized_header: String,
    pub target_table: String,
    pub target_column: String,
    pub occurrence_count: u64,
    #[serde(rename = "last_used_timestamp", alias = "last_used")]
    pub last_used: DateTime<Utc>,
}

impl HistoricalRecord {
    /// A first confirmation of this pair.
    pub fn first_seen(
        key: HistoryKey,
        target_column: impl Into<String>,
        when: DateTime<Utc>,
    ) -> Self {
        Self {
            normalized_header: key.normalized_header,
            target_table: key.target_table,
            target_column: target_column.into(),
            occurrence_count: 1,
            last_used: when,
        }
    }

    pub fn key(&self) -> HistoryKey {
        HistoryKey::new(&self.normalized_header, &self.target_table)
    }

    /// Fold a newer confirmation of the same key into this record.
    ///
    /// The count only grows; the target follows the newer confirmation.
    pub fn absorb(&mut self, update: &HistoricalRecord) {
        self.occurrence_count = self
            .occurrence_count
            .saturating_add(update.occurrence_count.max(1));
        self.target_column.clone_from(&update.target_column);
        if update.last_used > self.last_used {
            self.last_used = update.last_used;
        }
    }
}
