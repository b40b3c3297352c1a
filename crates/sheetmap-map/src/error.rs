use std::path::PathBuf;

use sheetmap_history::HistoryError;
use thiserror::Error;

use crate::selector::IdentificationFailure;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No sheet looked enough like the target table.
    #[error("sheet identification failed: {0}")]
    Identification(#[from] IdentificationFailure),

    /// A caller-named sheet does not exist.
    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    /// Confirmed mappings could not be persisted. Durable history is unchanged.
    #[error("failed to record confirmed mappings")]
    History(#[from] HistoryError),

    #[error("failed to read engine config {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid engine config {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The blocking mapping task panicked or was cancelled.
    #[error("mapping task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
