//! Shared data types for sheet identification and column mapping.
//!
//! Inputs ([`Workbook`], [`TargetSchema`]) are read-only for one mapping run.
//! Outputs ([`MappingResult`]) carry per-column decisions, warnings and
//! [`Diagnostic`]s. [`HistoricalRecord`] is the unit of durable memory.

pub mod confidence;
pub mod diagnostics;
pub mod error;
pub mod history;
pub mod mapping;
pub mod schema;
pub mod workbook;

pub use confidence::{ConfidenceThresholds, ConfidenceTier, clamp_confidence};
pub use diagnostics::{ConflictStage, Diagnostic, Severity};
pub use error::{EditError, ModelError};
pub use history::{HistoricalRecord, HistoryKey};
pub use mapping::{ColumnMapping, MappingResult, MappingWarning, Provenance};
pub use schema::{DataKind, TargetColumn, TargetSchema};
pub use workbook::{Column, Sheet, Workbook};
