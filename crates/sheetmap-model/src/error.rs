use thiserror::Error;

/// Errors raised while constructing model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("target table name is empty")]
    EmptyTargetTable,
    #[error("target column name is empty")]
    EmptyTargetColumnName,
    #[error("duplicate target column: {0}")]
    DuplicateTargetColumn(String),
}

/// Errors from manual edits of a mapping result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// Source column not present in the mapped sheet.
    #[error("source column not found: {0}")]
    SourceNotFound(String),
    /// Target column not present in the schema.
    #[error("target column not in schema: {0}")]
    TargetNotInSchema(String),
    /// Target already held by another source column.
    #[error("target column '{target}' already mapped from '{holder}'")]
    TargetAlreadyAssigned { target: String, holder: String },
}
