//! History store error types.
//!
//! Every failure carries a user-facing message and, where one exists, a
//! remediation hint.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    /// File I/O error.
    #[error("Failed to {operation} history file: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is JSON but not a history document.
    #[error("Invalid history file format: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    /// Written by a newer release.
    #[error("History file version {found} is not supported (maximum: {max_supported})")]
    UnsupportedVersion {
        found: u32,
        max_supported: u32,
        path: PathBuf,
    },

    #[error("Failed to serialize history")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse history file: {path}")]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Temp file written but could not replace the target.
    #[error("Failed to complete history save")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A non-file backend refused the operation.
    #[error("History store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl HistoryError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Io {
                operation, path, ..
            } => format!("Could not {} the history file at {}", operation, path.display()),
            Self::InvalidFormat { path, reason } => format!(
                "The file at {} is not a valid mapping history: {}",
                path.display(),
                reason
            ),
            Self::UnsupportedVersion {
                found,
                max_supported,
                ..
            } => format!(
                "This history file was written by a newer release \
                (file version {found}, this release supports up to {max_supported})."
            ),
            Self::Serialization { .. } => {
                "An error occurred while encoding the mapping history.".to_string()
            }
            Self::Deserialization { path, .. } => format!(
                "The history file at {} could not be read. It may be corrupted.",
                path.display()
            ),
            Self::AtomicWriteFailed { target_path, .. } => format!(
                "Could not save the history to {}. Previous history is unchanged.",
                target_path.display()
            ),
            Self::Unavailable { reason } => format!("The history store is unavailable: {reason}"),
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Io { operation, .. } => {
                if *operation == "read" {
                    Some("Check that the file exists and you have permission to read it.".into())
                } else {
                    Some("Check that you have permission to write to this location.".into())
                }
            }
            Self::InvalidFormat { .. } => {
                Some("Point --history at a file written by sheetmap, or a new path.".into())
            }
            Self::UnsupportedVersion { .. } => Some("Upgrade sheetmap to the latest release.".into()),
            Self::Serialization { .. } => None,
            Self::Deserialization { .. } => Some("Restore the file from a backup if you have one.".into()),
            Self::AtomicWriteFailed { .. } => {
                Some("Free up disk space or choose a different history location.".into())
            }
            Self::Unavailable { .. } => Some("Retry the confirmation later.".into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, HistoryError>;
