//! Batched language-model matching of unresolved columns.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;

use sheetmap_model::{Column, ColumnMapping, ConflictStage, Diagnostic, Sheet, TargetSchema};
use tracing::{debug, info, warn};

use crate::client::{CompletionRequest, LanguageModel};
use crate::config::AiConfig;
use crate::error::AiError;
use crate::prompt::{KnownHeaders, column_mapping_prompt, sheet_judgment_prompt};
use crate::response::{AiProposal, parse_mapping_reply, parse_sheet_judgment};

/// Outcome of one batched matching request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiResolution {
    /// One mapping per input column, in input order.
    pub mappings: Vec<ColumnMapping>,
    /// Rejected, conflicting or unparseable entries, or one `MatchingFailure`.
    pub diagnostics: Vec<Diagnostic>,
}

/// Error after the retry budget is spent.
#[derive(Debug)]
pub struct ExhaustedRetries {
    /// Calls made, including the first.
    pub attempts: u32,
    /// Error of the final call.
    pub last_error: AiError,
}

/// Delegates columns that history could not resolve to a language model.
#[derive(Clone)]
pub struct AiMatcher {
    model: Arc<dyn LanguageModel>,
    config: AiConfig,
}

impl std::fmt::Debug for AiMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiMatcher")
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl AiMatcher {
    pub fn new(model: Arc<dyn LanguageModel>, config: AiConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// Call the model, parsing with `parse`, retrying retryable failures with backoff.
    fn call_with_retry<T>(
        &self,
        request: &CompletionRequest,
        parse: impl Fn(&str) -> Result<T, AiError>,
    ) -> Result<T, ExhaustedRetries> {
        let attempts = self.config.retry.attempts();
        let mut attempt = 1;
        loop {
            let outcome = self
                .model
                .complete(request)
                .and_then(|reply| parse(&reply));
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_retryable() => {
                    let delay = self.config.retry.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "language-model call failed, retrying"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    return Err(ExhaustedRetries {
                        attempts: attempt,
                        last_error: err,
                    });
                }
            }
        }
    }

    /// Resolve `columns` against `schema` in one batched request.
    ///
    /// `known` lists headers already confirmed for each target and is sent
    /// as context. Never fails: on exhausted retries every column comes back
    /// unresolved with a single `MatchingFailure` diagnostic.
    pub fn resolve(
        &self,
        columns: &[&Column],
        schema: &TargetSchema,
        known: &KnownHeaders,
    ) -> AiResolution {
        if columns.is_empty() {
            return AiResolution::default();
        }
        let request = column_mapping_prompt(schema, known, columns, self.config.sample_size);
        match self.call_with_retry(&request, |reply| parse_mapping_reply(reply, schema)) {
            Ok(proposals) => apply_proposals(columns, proposals),
            Err(ExhaustedRetries {
                attempts,
                last_error,
            }) => {
                warn!(
                    attempts,
                    column_count = columns.len(),
                    error = %last_error,
                    "AI matching failed, leaving batch unresolved"
                );
                AiResolution {
                    mappings: columns
                        .iter()
                        .map(|c| {
                            ColumnMapping::unresolved(&c.header)
                                .with_rationale("AI matching unavailable")
                        })
                        .collect(),
                    diagnostics: vec![Diagnostic::MatchingFailure {
                        headers: columns.iter().map(|c| c.header.clone()).collect(),
                        attempts,
                        message: last_error.to_string(),
                    }],
                }
            }
        }
    }

    /// Ask which target columns each sheet semantically contains.
    pub fn judge_sheets(
        &self,
        sheets: &[&Sheet],
        schema: &TargetSchema,
        known: &KnownHeaders,
    ) -> Result<BTreeMap<String, Vec<String>>, ExhaustedRetries> {
        let request = sheet_judgment_prompt(schema, known, sheets, self.config.sample_size);
        self.call_with_retry(&request, |reply| parse_sheet_judgment(reply, schema))
    }
}

/// Turn parsed proposals into one mapping per input column.
///
/// The first proposal for a target wins; later claims are unresolved with a
/// conflict diagnostic.
fn apply_proposals(columns: &[&Column], proposals: Vec<AiProposal>) -> AiResolution {
    let batch: BTreeSet<&str> = columns.iter().map(|c| c.header.as_str()).collect();
    let mut decided: BTreeMap<String, ColumnMapping> = BTreeMap::new();
    let mut target_holders: BTreeMap<String, String> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for proposal in proposals {
        if let Some(header) = proposal.source_header() {
            if !batch.contains(header) {
                diagnostics.push(Diagnostic::UnparseableEntry {
                    raw: header.to_string(),
                    reason: "source header not in request".to_string(),
                });
                continue;
            }
            if decided.contains_key(header) {
                debug!(header, "ignoring repeated AI entry for source header");
                continue;
            }
        }

        match proposal {
            AiProposal::Mapping {
                source_header,
                target_column,
                confidence,
                rationale,
            } => {
                if let Some(holder) = target_holders.get(&target_column) {
                    diagnostics.push(Diagnostic::ConflictFailure {
                        source_header: source_header.clone(),
                        target_column: target_column.clone(),
                        kept_source: holder.clone(),
                        stage: ConflictStage::AiResponse,
                    });
                    let mapping = ColumnMapping::unresolved(&source_header)
                        .with_rationale(format!("'{target_column}' already proposed for '{holder}'"));
                    decided.insert(source_header, mapping);
                    continue;
                }
                target_holders.insert(target_column.clone(), source_header.clone());
                let mut mapping = ColumnMapping::ai(&source_header, target_column, confidence);
                mapping.rationale = rationale;
                decided.insert(source_header, mapping);
            }
            AiProposal::HallucinatedTarget {
                source_header,
                proposed_target,
            } => {
                let mapping = ColumnMapping::unresolved(&source_header)
                    .with_rationale(format!("proposed unknown target '{proposed_target}'"));
                diagnostics.push(Diagnostic::ValidationFailure {
                    source_header: source_header.clone(),
                    proposed_target,
                });
                decided.insert(source_header, mapping);
            }
            AiProposal::NoMatch {
                source_header,
                rationale,
            } => {
                let mut mapping = ColumnMapping::unresolved(&source_header);
                mapping.rationale = rationale;
                decided.insert(source_header, mapping);
            }
            AiProposal::Unparseable { raw, reason } => {
                diagnostics.push(Diagnostic::UnparseableEntry { raw, reason });
            }
        }
    }

    let mappings: Vec<ColumnMapping> = columns
        .iter()
        .map(|column| {
            decided.remove(&column.header).unwrap_or_else(|| {
                ColumnMapping::unresolved(&column.header).with_rationale("no AI proposal")
            })
        })
        .collect();

    info!(
        column_count = columns.len(),
        resolved = mappings.iter().filter(|m| m.is_resolved()).count(),
        diagnostics = diagnostics.len(),
        "AI matching complete"
    );
    AiResolution {
        mappings,
        diagnostics,
    }
}
