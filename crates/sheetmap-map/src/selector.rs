//! Selection of the sheet most likely to hold the target table.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sheetmap_ai::AiMatcher;
use sheetmap_history::HistoryIndex;
use sheetmap_model::{Sheet, TargetColumn, TargetSchema, Workbook};
use tracing::{debug, info, warn};

use crate::historical::known_headers;
use crate::normalize::{Normalizer, contains_words};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Minimum fraction of key targets a sheet must cover.
    pub acceptance: f32,
    /// Sheets with fewer data rows are not scored. Zero-row sheets never are.
    pub min_rows: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            acceptance: 0.5,
            min_rows: 1,
        }
    }
}

/// Score of one candidate sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetScore {
    /// Position in the workbook.
    pub index: usize,
    pub name: String,
    /// Key targets found on the sheet, in schema order.
    pub matched: Vec<String>,
    /// `matched / key targets`, in `[0, 1]`.
    pub score: f32,
    /// Whether an AI judgment contributed to `matched`.
    pub ai_assisted: bool,
}

/// A sheet not scored at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedSheet {
    /// Position in the workbook.
    pub index: usize,
    pub name: String,
    /// Data rows below the header; under `min_rows` or zero.
    pub row_count: usize,
}

/// The chosen sheet plus the full scoring picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSelection {
    /// Position of the chosen sheet in the workbook.
    pub index: usize,
    /// Name of the chosen sheet.
    pub name: String,
    /// Score of the chosen sheet, at least the acceptance threshold.
    pub score: f32,
    /// Every scored sheet in workbook order, the chosen one included.
    pub candidates: Vec<SheetScore>,
    /// Sheets skipped for having too few data rows.
    pub excluded: Vec<ExcludedSheet>,
}

/// No sheet reached the acceptance threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationFailure {
    /// Threshold no candidate reached.
    pub acceptance: f32,
    /// Every scored sheet in workbook order.
    pub candidates: Vec<SheetScore>,
    pub excluded: Vec<ExcludedSheet>,
}

impl fmt::Display for IdentificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no sheet reached {:.0}% of the target columns",
            self.acceptance * 100.0
        )?;
        if self.candidates.is_empty() {
            return write!(f, " (no sheet with data rows)");
        }
        let scores: Vec<String> = self
            .candidates
            .iter()
            .map(|c| format!("{}={:.2}", c.name, c.score))
            .collect();
        write!(f, " (candidates: {})", scores.join(", "))
    }
}

impl std::error::Error for IdentificationFailure {}

/// Scores sheets by how many key target columns they appear to contain.
///
/// Key targets are the required columns, or every column when none are
/// required.
pub struct SheetSelector<'a> {
    config: &'a SelectorConfig,
    normalizer: &'a Normalizer,
    history: &'a HistoryIndex,
    ai: Option<&'a AiMatcher>,
}

impl<'a> SheetSelector<'a> {
    pub fn new(
        config: &'a SelectorConfig,
        normalizer: &'a Normalizer,
        history: &'a HistoryIndex,
        ai: Option<&'a AiMatcher>,
    ) -> Self {
        Self {
            config,
            normalizer,
            history,
            ai,
        }
    }

    pub fn select(
        &self,
        workbook: &Workbook,
        schema: &TargetSchema,
    ) -> Result<SheetSelection, IdentificationFailure> {
        let keys = key_targets(schema);
        let mut candidates = Vec::new();
        let mut excluded = Vec::new();

        for (index, sheet) in workbook.sheets.iter().enumerate() {
            if sheet.row_count == 0 || sheet.row_count < self.config.min_rows {
                debug!(sheet = %sheet.name, row_count = sheet.row_count, "sheet excluded from scoring");
                excluded.push(ExcludedSheet {
                    index,
                    name: sheet.name.clone(),
                    row_count: sheet.row_count,
                });
                continue;
            }
            let matched = self.lexical_matches(sheet, schema, &keys);
            candidates.push(SheetScore {
                index,
                name: sheet.name.clone(),
                score: ratio(matched.len(), keys.len()),
                matched: ordered(&keys, &matched),
                ai_assisted: false,
            });
        }

        if self.is_ambiguous(&candidates) {
            self.apply_ai_judgment(workbook, schema, &keys, &mut candidates);
        }

        let best = best_candidate(&candidates).map(|b| (b.index, b.name.clone(), b.score));
        match best {
            Some((index, name, score)) if score >= self.config.acceptance => {
                info!(
                    sheet = %name,
                    index,
                    score,
                    candidate_count = candidates.len(),
                    "selected sheet"
                );
                Ok(SheetSelection {
                    index,
                    name,
                    score,
                    candidates,
                    excluded,
                })
            }
            _ => {
                warn!(
                    candidate_count = candidates.len(),
                    excluded_count = excluded.len(),
                    acceptance = self.config.acceptance,
                    "no sheet identified"
                );
                Err(IdentificationFailure {
                    acceptance: self.config.acceptance,
                    candidates,
                    excluded,
                })
            }
        }
    }

    /// Key targets present on `sheet` through history or header text.
    fn lexical_matches(
        &self,
        sheet: &Sheet,
        schema: &TargetSchema,
        keys: &[&TargetColumn],
    ) -> BTreeSet<String> {
        let headers: Vec<String> = sheet
            .headers()
            .map(|h| self.normalizer.normalize(h))
            .filter(|h| !h.is_empty())
            .collect();

        let mut matched = BTreeSet::new();
        for target in keys {
            let remembered = headers.iter().any(|header| {
                self.history
                    .get(header, schema.table())
                    .is_some_and(|r| r.target_column.eq_ignore_ascii_case(&target.name))
            });
            let named = remembered
                || target.spellings().any(|spelling| {
                    let needle = self.normalizer.normalize(spelling);
                    headers.iter().any(|header| contains_words(header, &needle))
                });
            if named {
                matched.insert(target.name.clone());
            }
        }
        matched
    }

    fn is_ambiguous(&self, candidates: &[SheetScore]) -> bool {
        let Some(best) = best_candidate(candidates) else {
            return false;
        };
        let tied = candidates
            .iter()
            .filter(|c| c.score.partial_cmp(&best.score) == Some(Ordering::Equal))
            .count()
            > 1;
        tied || best.score < self.config.acceptance
    }

    /// Merge a coarse AI judgment into lexical matches. Failures keep lexical scores.
    fn apply_ai_judgment(
        &self,
        workbook: &Workbook,
        schema: &TargetSchema,
        keys: &[&TargetColumn],
        candidates: &mut [SheetScore],
    ) {
        let Some(ai) = self.ai else {
            return;
        };
        let sheets: Vec<&Sheet> = candidates
            .iter()
            .filter_map(|c| workbook.sheets.get(c.index))
            .collect();
        let known = known_headers(self.history, schema);
        let judgment = match ai.judge_sheets(&sheets, schema, &known) {
            Ok(judgment) => judgment,
            Err(failure) => {
                warn!(
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    "AI sheet judgment failed, keeping lexical scores"
                );
                return;
            }
        };

        let key_names: BTreeSet<&str> = keys.iter().map(|k| k.name.as_str()).collect();
        for candidate in candidates.iter_mut() {
            let Some(present) = judgment.get(&candidate.name) else {
                continue;
            };
            let mut matched: BTreeSet<String> = candidate.matched.iter().cloned().collect();
            let before = matched.len();
            matched.extend(
                present
                    .iter()
                    .filter(|name| key_names.contains(name.as_str()))
                    .cloned(),
            );
            if matched.len() > before {
                candidate.ai_assisted = true;
                candidate.score = ratio(matched.len(), keys.len());
                candidate.matched = ordered(keys, &matched);
                debug!(sheet = %candidate.name, score = candidate.score, "AI judgment raised sheet score");
            }
        }
    }
}

fn key_targets(schema: &TargetSchema) -> Vec<&TargetColumn> {
    let required: Vec<&TargetColumn> = schema.required().collect();
    if required.is_empty() {
        schema.columns().iter().collect()
    } else {
        required
    }
}

fn ratio(matched: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        matched as f32 / total as f32
    }
}

fn ordered(keys: &[&TargetColumn], matched: &BTreeSet<String>) -> Vec<String> {
    keys.iter()
        .filter(|k| matched.contains(&k.name))
        .map(|k| k.name.clone())
        .collect()
}

/// Highest score; the earliest sheet wins ties.
fn best_candidate(candidates: &[SheetScore]) -> Option<&SheetScore> {
    candidates.iter().fold(None, |best: Option<&SheetScore>, c| match best {
        Some(b) if c.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal) != Ordering::Greater => {
            Some(b)
        }
        _ => Some(c),
    })
}
