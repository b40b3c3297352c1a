//! Durable memory of confirmed header-to-target mappings.
//!
//! - [`HistoryStore`]: stage-then-flush persistence contract
//! - [`JsonHistoryStore`]: atomic JSON file store
//! - [`MemoryHistoryStore`]: in-process store
//! - [`HistoryIndex`]: read-only lookup used during matching

mod error;
mod index;
mod json;
mod store;

pub use error::{HistoryError, Result};
pub use index::HistoryIndex;
pub use json::{HISTORY_FORMAT_VERSION, JsonHistoryStore};
pub use store::{HistoryStore, MemoryHistoryStore};
