//! Parsing of language-model replies.
//!
//! Replies are free text that should contain one JSON object. The first
//! balanced object that parses is extracted, so markdown fences or
//! surrounding prose are tolerated.

use std::collections::BTreeMap;

use serde_json::Value;
use sheetmap_model::{TargetSchema, clamp_confidence};

use crate::error::{AiError, Result};

/// Confidence assumed when a reply entry omits one.
pub const DEFAULT_AI_CONFIDENCE: f32 = 0.7;

/// One interpreted entry of a column-mapping reply.
#[derive(Debug, Clone, PartialEq)]
pub enum AiProposal {
    /// Target exists in the schema.
    Mapping {
        source_header: String,
        target_column: String,
        confidence: f32,
        rationale: Option<String>,
    },
    /// Target named by the model is not in the schema.
    HallucinatedTarget {
        source_header: String,
        proposed_target: String,
    },
    /// The model found no fitting target.
    NoMatch {
        source_header: String,
        rationale: Option<String>,
    },
    /// The entry could not be interpreted.
    Unparseable { raw: String, reason: String },
}

impl AiProposal {
    pub fn source_header(&self) -> Option<&str> {
        match self {
            Self::Mapping { source_header, .. }
            | Self::HallucinatedTarget { source_header, .. }
            | Self::NoMatch { source_header, .. } => Some(source_header),
            Self::Unparseable { .. } => None,
        }
    }
}

/// Return the first balanced `{...}` in `text` that parses as JSON.
///
/// Candidates that are balanced but not JSON, such as a brace snippet in
/// surrounding prose, are skipped and scanning resumes after their opening
/// brace. String escapes are honoured while balancing.
pub fn extract_first_json(text: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(found) = text[from..].find('{') {
        let start = from + found;
        if let Some(end) = balanced_end(text, start) {
            let candidate = &text[start..end];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate);
            }
        }
        from = start + 1;
    }
    None
}

/// Byte offset just past the brace closing the one at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object(text: &str) -> Result<Value> {
    let json = extract_first_json(text)
        .ok_or_else(|| AiError::MalformedResponse("no JSON object in reply".to_string()))?;
    serde_json::from_str(json).map_err(|e| AiError::MalformedResponse(e.to_string()))
}

fn string_field<'a>(entry: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| entry.get(*name))
        .and_then(Value::as_str)
        .map(str::trim)
}

fn parse_confidence(entry: &Value) -> std::result::Result<f32, String> {
    match entry.get("confidence") {
        None | Some(Value::Null) => Ok(DEFAULT_AI_CONFIDENCE),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(|v| clamp_confidence(v as f32))
            .ok_or_else(|| "confidence is not a finite number".to_string()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f32>()
            .map(clamp_confidence)
            .map_err(|_| format!("confidence {s:?} is not a number")),
        Some(other) => Err(format!("confidence has unexpected type: {other}")),
    }
}

fn interpret_entry(entry: &Value, schema: &TargetSchema) -> AiProposal {
    let unparseable = |reason: String| AiProposal::Unparseable {
        raw: entry.to_string(),
        reason,
    };
    let Some(source_header) = string_field(entry, &["source_header", "source", "header"]) else {
        return unparseable("missing source_header".to_string());
    };
    let rationale = string_field(entry, &["rationale", "reason"])
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    let target = match entry.get("target_column").or_else(|| entry.get("target")) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.trim()),
        Some(other) => return unparseable(format!("target_column has unexpected type: {other}")),
    };
    let Some(target) = target else {
        return AiProposal::NoMatch {
            source_header: source_header.to_string(),
            rationale,
        };
    };

    let Some(column) = schema.column(target) else {
        return AiProposal::HallucinatedTarget {
            source_header: source_header.to_string(),
            proposed_target: target.to_string(),
        };
    };
    match parse_confidence(entry) {
        Ok(confidence) => AiProposal::Mapping {
            source_header: source_header.to_string(),
            target_column: column.name.clone(),
            confidence,
            rationale,
        },
        Err(reason) => unparseable(reason),
    }
}

/// Interpret a column-mapping reply.
///
/// A reply without a `mappings` array is malformed as a whole; individual
/// bad entries become [`AiProposal::Unparseable`].
pub fn parse_mapping_reply(text: &str, schema: &TargetSchema) -> Result<Vec<AiProposal>> {
    let value = parse_object(text)?;
    let entries = value
        .get("mappings")
        .and_then(Value::as_array)
        .ok_or_else(|| AiError::MalformedResponse("reply has no \"mappings\" array".to_string()))?;
    Ok(entries
        .iter()
        .map(|entry| interpret_entry(entry, schema))
        .collect())
}

/// Interpret a sheet-judgment reply as `sheet name -> target columns present`.
///
/// Target names are canonicalized against the schema; unknown names are dropped.
pub fn parse_sheet_judgment(
    text: &str,
    schema: &TargetSchema,
) -> Result<BTreeMap<String, Vec<String>>> {
    let value = parse_object(text)?;
    let sheets = value
        .get("sheets")
        .and_then(Value::as_array)
        .ok_or_else(|| AiError::MalformedResponse("reply has no \"sheets\" array".to_string()))?;

    let mut judgment = BTreeMap::new();
    for entry in sheets {
        let Some(name) = entry.get("sheet").and_then(Value::as_str) else {
            continue;
        };
        let present: Vec<String> = entry
            .get("present")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter_map(|target| schema.column(target))
            .map(|column| column.name.clone())
            .collect();
        judgment.insert(name.to_string(), present);
    }
    Ok(judgment)
}
