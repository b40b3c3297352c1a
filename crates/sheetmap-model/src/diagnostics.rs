//! Per-mapping diagnostics attached to a [`MappingResult`](crate::MappingResult).
//!
//! Diagnostics never abort a mapping run; they explain why a column ended up
//! unresolved or why one proposal was preferred over another.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a target conflict was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStage {
    /// Two entries of one language-model reply claimed the same target.
    AiResponse,
    /// Historical and AI results together claimed the same target.
    Aggregation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The language-model call failed after every retry.
    MatchingFailure {
        headers: Vec<String>,
        attempts: u32,
        message: String,
    },
    /// The model proposed a target that is not in the schema.
    ValidationFailure {
        source_header: String,
        proposed_target: String,
    },
    /// A source lost its target to another source.
    ConflictFailure {
        source_header: String,
        target_column: String,
        kept_source: String,
        stage: ConflictStage,
    },
    /// An AI proposal replaced a historical match.
    Override {
        source_header: String,
        historical_target: String,
        historical_confidence: f32,
        ai_target: String,
        ai_confidence: f32,
    },
    /// One entry of a model reply could not be interpreted.
    UnparseableEntry { raw: String, reason: String },
    /// History could not be loaded; matching ran with empty memory.
    HistoryUnavailable { message: String },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Override { .. } => Severity::Info,
            _ => Severity::Warning,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MatchingFailure { .. } => "matching_failure",
            Self::ValidationFailure { .. } => "validation_failure",
            Self::ConflictFailure { .. } => "conflict_failure",
            Self::Override { .. } => "override",
            Self::UnparseableEntry { .. } => "unparseable_entry",
            Self::HistoryUnavailable { .. } => "history_unavailable",
        }
    }

    /// Source header this diagnostic concerns, when it concerns exactly one.
    pub fn source_header(&self) -> Option<&str> {
        match self {
            Self::ValidationFailure { source_header, .. }
            | Self::ConflictFailure { source_header, .. }
            | Self::Override { source_header, .. } => Some(source_header),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MatchingFailure {
                headers,
                attempts,
                message,
            } => write!(
                f,
                "AI matching failed after {attempts} attempt(s) for {} column(s): {message}",
                headers.len()
            ),
            Self::ValidationFailure {
                source_header,
                proposed_target,
            } => write!(
                f,
                "'{source_header}': proposed target '{proposed_target}' is not in the schema"
            ),
            Self::ConflictFailure {
                source_header,
                target_column,
                kept_source,
                ..
            } => write!(
                f,
                "'{source_header}': target '{target_column}' already taken by '{kept_source}'"
            ),
            Self::Override {
                source_header,
                historical_target,
                historical_confidence,
                ai_target,
                ai_confidence,
            } => write!(
                f,
                "'{source_header}': AI '{ai_target}' ({ai_confidence:.2}) replaced history '{historical_target}' ({historical_confidence:.2})"
            ),
            Self::UnparseableEntry { raw, reason } => {
                write!(f, "unparseable AI entry ({reason}): {raw}")
            }
            Self::HistoryUnavailable { message } => {
                write!(f, "history unavailable, matching without memory: {message}")
            }
        }
    }
}
