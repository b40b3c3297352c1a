//! Resolution of normalized headers against remembered mappings.

use std::cmp::Ordering;

use rapidfuzz::distance::levenshtein;
use serde::{Deserialize, Serialize};
use sheetmap_ai::KnownHeaders;
use sheetmap_history::HistoryIndex;
use sheetmap_model::{ColumnMapping, HistoricalRecord, TargetSchema};

/// Most remembered headers listed per target in AI prompts.
pub const MAX_KNOWN_HEADERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalConfig {
    /// Pseudo-count in `1 - 1/(prior + occurrence_count)`.
    pub prior: f32,
    /// Minimum normalized Levenshtein similarity for a fuzzy match.
    pub fuzzy_threshold: f32,
    /// Fuzzy matches below this confidence also go to the AI matcher.
    pub second_opinion_below: f32,
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            prior: 2.0,
            fuzzy_threshold: 0.85,
            second_opinion_below: 0.7,
        }
    }
}

/// Confidence of an exact match seen `occurrence_count` times.
///
/// Grows with the count and never reaches 1.0.
pub fn exact_confidence(occurrence_count: u64, prior: f32) -> f32 {
    let denominator = f64::from(prior.max(1.0)) + occurrence_count as f64;
    (1.0 - 1.0 / denominator) as f32
}

/// Remembered headers for `schema`'s table, grouped under the schema's
/// spelling of each target.
///
/// Records whose target is no longer in the schema are left out. The most
/// confirmed headers come first, at most [`MAX_KNOWN_HEADERS`] per target.
pub fn known_headers(index: &HistoryIndex, schema: &TargetSchema) -> KnownHeaders {
    let mut records: Vec<&HistoricalRecord> = index.records_for(schema.table()).collect();
    records.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));

    let mut known = KnownHeaders::new();
    for record in records {
        let Some(column) = schema.column(&record.target_column) else {
            continue;
        };
        if known.for_target(&column.name).len() < MAX_KNOWN_HEADERS {
            known.insert(&column.name, &record.normalized_header);
        }
    }
    known
}

/// How a historical match was found.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchKind {
    Exact,
    Fuzzy {
        matched_header: String,
        similarity: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalMatch {
    /// Remembered target, in the schema's spelling once validated.
    pub target_column: String,
    /// Exact confidence, scaled by similarity for fuzzy matches.
    pub confidence: f32,
    pub kind: MatchKind,
}

impl HistoricalMatch {
    pub fn is_fuzzy(&self) -> bool {
        matches!(self.kind, MatchKind::Fuzzy { .. })
    }

    pub fn into_mapping(self, source_header: &str) -> ColumnMapping {
        let rationale = match &self.kind {
            MatchKind::Exact => "exact history match".to_string(),
            MatchKind::Fuzzy {
                matched_header,
                similarity,
            } => format!("similar to remembered header '{matched_header}' ({similarity:.2})"),
        };
        ColumnMapping::historical(source_header, self.target_column, self.confidence)
            .with_rationale(rationale)
    }
}

/// Looks headers up in a history snapshot, exactly first and then fuzzily.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalMatcher<'a> {
    index: &'a HistoryIndex,
    config: &'a HistoricalConfig,
}

impl<'a> HistoricalMatcher<'a> {
    pub fn new(index: &'a HistoryIndex, config: &'a HistoricalConfig) -> Self {
        Self { index, config }
    }

    /// Resolve `normalized_header` for `target_table`. Absence is not an error.
    pub fn match_header(&self, normalized_header: &str, target_table: &str) -> Option<HistoricalMatch> {
        if normalized_header.is_empty() {
            return None;
        }
        if let Some(record) = self.index.get(normalized_header, target_table) {
            return Some(HistoricalMatch {
                target_column: record.target_column.clone(),
                confidence: exact_confidence(record.occurrence_count, self.config.prior),
                kind: MatchKind::Exact,
            });
        }

        // Records iterate in header order, so the first best wins ties.
        let mut best: Option<(&HistoricalRecord, f32)> = None;
        for record in self.index.records_for(target_table) {
            let similarity = levenshtein::normalized_similarity(
                normalized_header.chars(),
                record.normalized_header.chars(),
            ) as f32;
            if similarity < self.config.fuzzy_threshold {
                continue;
            }
            let better = best.is_none_or(|(_, current)| {
                similarity.partial_cmp(&current).unwrap_or(Ordering::Equal) == Ordering::Greater
            });
            if better {
                best = Some((record, similarity));
            }
        }

        best.map(|(record, similarity)| HistoricalMatch {
            target_column: record.target_column.clone(),
            confidence: exact_confidence(record.occurrence_count, self.config.prior) * similarity,
            kind: MatchKind::Fuzzy {
                matched_header: record.normalized_header.clone(),
                similarity,
            },
        })
    }

    /// Whether a match is weak enough to also ask the AI matcher.
    pub fn wants_second_opinion(&self, found: &HistoricalMatch) -> bool {
        found.is_fuzzy() && found.confidence < self.config.second_opinion_below
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sheetmap_model::{DataKind, HistoryKey, TargetColumn};

    use super::*;

    fn record(header: &str, target: &str, count: u64) -> HistoricalRecord {
        let mut record =
            HistoricalRecord::first_seen(HistoryKey::new(header, "customers"), target, Utc::now());
        record.occurrence_count = count;
        record
    }

    #[test]
    fn exact_confidence_saturates_below_one() {
        assert!((exact_confidence(1, 2.0) - 0.6667).abs() < 1e-3);
        assert_eq!(exact_confidence(3, 2.0), 0.8);
        assert!(exact_confidence(5, 2.0) > exact_confidence(3, 2.0));
        assert!(exact_confidence(u64::MAX / 2, 2.0) <= 1.0);
    }

    #[test]
    fn exact_match_wins_over_fuzzy() {
        let index = HistoryIndex::new([record("cust email", "email", 4), record("cust emails", "alt", 9)]);
        let config = HistoricalConfig::default();
        let matcher = HistoricalMatcher::new(&index, &config);
        let found = matcher.match_header("cust email", "customers").unwrap();
        assert_eq!(found.kind, MatchKind::Exact);
        assert_eq!(found.target_column, "email");
    }

    #[test]
    fn fuzzy_match_scales_confidence_by_similarity() {
        let index = HistoryIndex::new([record("customer email", "email", 3)]);
        let config = HistoricalConfig::default();
        let matcher = HistoricalMatcher::new(&index, &config);
        let found = matcher.match_header("customer e mail", "customers").unwrap();
        let MatchKind::Fuzzy { similarity, .. } = found.kind else {
            panic!("expected fuzzy match");
        };
        assert!(similarity >= 0.85 && similarity < 1.0);
        assert!((found.confidence - 0.8 * similarity).abs() < 1e-6);
    }

    #[test]
    fn fuzzy_tie_prefers_lexicographically_smaller_header() {
        let index = HistoryIndex::new([record("phone b", "phone_b", 1), record("phone a", "phone_a", 1)]);
        let config = HistoricalConfig {
            fuzzy_threshold: 0.8,
            ..HistoricalConfig::default()
        };
        let matcher = HistoricalMatcher::new(&index, &config);
        let found = matcher.match_header("phone c", "customers").unwrap();
        assert_eq!(found.target_column, "phone_a");
    }

    #[test]
    fn dissimilar_or_other_table_is_none() {
        let index = HistoryIndex::new([record("cust email", "email", 4)]);
        let config = HistoricalConfig::default();
        let matcher = HistoricalMatcher::new(&index, &config);
        assert!(matcher.match_header("balance", "customers").is_none());
        assert!(matcher.match_header("cust email", "vendors").is_none());
        assert!(matcher.match_header("", "customers").is_none());
    }

    #[test]
    fn known_headers_follow_schema_spelling_and_skip_stale_targets() {
        let index = HistoryIndex::new([
            record("e mail", "EMAIL", 2),
            record("cust email", "email", 6),
            record("given name", "fname", 9),
        ]);
        let schema = TargetSchema::new(
            "customers",
            vec![
                TargetColumn::new("email", DataKind::Text),
                TargetColumn::new("first_name", DataKind::Text),
            ],
        )
        .unwrap();
        let known = known_headers(&index, &schema);
        assert_eq!(known.for_target("email"), ["cust email", "e mail"]);
        assert!(known.for_target("first_name").is_empty());
        assert!(known.for_target("fname").is_empty());
    }
}
