//! Prompt construction for column mapping and sheet judgment.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use sheetmap_model::{Column, Sheet, TargetSchema};

use crate::client::CompletionRequest;

const SYSTEM_PROMPT: &str = "You map spreadsheet column headers onto database columns. \
Answer with a single JSON object and nothing else.";

/// Headers already confirmed for each target column, keyed by the schema's
/// spelling of the column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownHeaders {
    by_target: BTreeMap<String, Vec<String>>,
}

impl KnownHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `header` for `target`; repeats are ignored.
    pub fn insert(&mut self, target: impl Into<String>, header: impl Into<String>) {
        let header = header.into();
        let headers = self.by_target.entry(target.into()).or_default();
        if !headers.contains(&header) {
            headers.push(header);
        }
    }

    pub fn for_target(&self, target: &str) -> &[String] {
        self.by_target
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}

fn quoted_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| serde_json::to_string(v).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_schema(out: &mut String, schema: &TargetSchema, known: &KnownHeaders) {
    let _ = writeln!(out, "Target table: {}", schema.table());
    let _ = writeln!(out, "Target columns:");
    for column in schema.columns() {
        let _ = write!(
            out,
            "- {} ({}{})",
            column.name,
            column.kind,
            if column.required { ", required" } else { "" }
        );
        if let Some(description) = &column.description {
            let _ = write!(out, ": {description}");
        }
        if !column.aliases.is_empty() {
            let _ = write!(out, "; also called {}", column.aliases.join(", "));
        }
        if !column.examples.is_empty() {
            let _ = write!(out, "; examples {}", column.examples.join(", "));
        }
        let remembered = known.for_target(&column.name);
        if !remembered.is_empty() {
            let _ = write!(out, "; previously mapped from {}", quoted_list(remembered));
        }
        out.push('\n');
    }
}

fn samples(column: &Column, sample_size: usize) -> String {
    let values: Vec<&str> = column
        .samples
        .iter()
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .take(sample_size)
        .collect();
    serde_json::to_string(&values).unwrap_or_else(|_| "[]".to_string())
}

/// Ask for a target per source column in one batched request.
pub fn column_mapping_prompt(
    schema: &TargetSchema,
    known: &KnownHeaders,
    columns: &[&Column],
    sample_size: usize,
) -> CompletionRequest {
    let mut user = String::new();
    write_schema(&mut user, schema, known);
    user.push_str("\nSource columns (header: sample values):\n");
    for column in columns {
        let _ = writeln!(
            user,
            "- {}: {}",
            serde_json::to_string(&column.header).unwrap_or_default(),
            samples(column, sample_size)
        );
    }
    user.push_str(
        "\nMap each source column to at most one target column. \
Use each target column at most once. Use null when no target fits.\n\
Reply as {\"mappings\": [{\"source_header\": \"...\", \"target_column\": \"...\" or null, \
\"rationale\": \"...\", \"confidence\": 0.0-1.0}]}",
    );
    CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Ask which required target columns each sheet semantically contains.
pub fn sheet_judgment_prompt(
    schema: &TargetSchema,
    known: &KnownHeaders,
    sheets: &[&Sheet],
    sample_size: usize,
) -> CompletionRequest {
    let mut user = String::new();
    write_schema(&mut user, schema, known);
    user.push_str("\nCandidate sheets:\n");
    for sheet in sheets {
        let _ = writeln!(
            user,
            "Sheet {} ({} rows):",
            serde_json::to_string(&sheet.name).unwrap_or_default(),
            sheet.row_count
        );
        for column in &sheet.columns {
            let _ = writeln!(
                user,
                "  - {}: {}",
                serde_json::to_string(&column.header).unwrap_or_default(),
                samples(column, sample_size)
            );
        }
    }
    user.push_str(
        "\nFor every sheet, list the target columns whose data the sheet contains.\n\
Reply as {\"sheets\": [{\"sheet\": \"...\", \"present\": [\"target column\", ...]}]}",
    );
    CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}
