//! Merging of historical and AI proposals into one mapping result.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sheetmap_model::{
    ColumnMapping, ConflictStage, Diagnostic, MappingResult, Sheet, TargetSchema,
};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// AI must beat a historical match by more than this to replace it.
    pub override_delta: f32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            override_delta: 0.15,
        }
    }
}

/// Proposals gathered for one source column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProposals {
    pub source_header: String,
    pub historical: Option<ColumnMapping>,
    pub ai: Option<ColumnMapping>,
}

impl ColumnProposals {
    pub fn new(source_header: impl Into<String>) -> Self {
        Self {
            source_header: source_header.into(),
            historical: None,
            ai: None,
        }
    }
}

/// Chooses one mapping per column and enforces target uniqueness.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceAggregator<'a> {
    config: &'a AggregatorConfig,
}

impl<'a> ConfidenceAggregator<'a> {
    pub fn new(config: &'a AggregatorConfig) -> Self {
        Self { config }
    }

    /// Merge proposals for `sheet` into a result. Never fails.
    ///
    /// `diagnostics` from earlier stages are carried into the result ahead of
    /// the ones raised here.
    pub fn aggregate(
        &self,
        sheet: &Sheet,
        schema: &TargetSchema,
        proposals: Vec<ColumnProposals>,
        mut diagnostics: Vec<Diagnostic>,
    ) -> MappingResult {
        let mut mappings: Vec<ColumnMapping> = proposals
            .into_iter()
            .map(|p| self.choose(p, &mut diagnostics))
            .collect();

        enforce_unique_targets(&mut mappings, &mut diagnostics);

        let result = MappingResult::new(&sheet.name, schema, mappings, diagnostics);
        info!(
            sheet = %result.sheet_name,
            target_table = %result.target_table,
            mapped = result.resolved().count(),
            unmet_required = result.warnings.len(),
            overall_confidence = result.overall_confidence,
            "aggregated column mappings"
        );
        result
    }

    fn choose(&self, proposals: ColumnProposals, diagnostics: &mut Vec<Diagnostic>) -> ColumnMapping {
        let ColumnProposals {
            source_header,
            historical,
            ai,
        } = proposals;
        match (historical, ai) {
            (Some(hist), Some(ai)) if ai.is_resolved() => {
                let differs = hist.target_column != ai.target_column;
                if differs && ai.confidence() > hist.confidence() + self.config.override_delta {
                    diagnostics.push(Diagnostic::Override {
                        source_header: source_header.clone(),
                        historical_target: hist.target_column.clone().unwrap_or_default(),
                        historical_confidence: hist.confidence(),
                        ai_target: ai.target_column.clone().unwrap_or_default(),
                        ai_confidence: ai.confidence(),
                    });
                    debug!(header = %source_header, "AI proposal overrides history");
                    ai
                } else {
                    hist
                }
            }
            (Some(hist), _) => hist,
            // Unresolved AI entries keep their rationale.
            (None, Some(ai)) => ai,
            (None, None) => ColumnMapping::unresolved(source_header),
        }
    }
}

/// Keep the highest-confidence claim on each target; earlier columns win ties.
fn enforce_unique_targets(mappings: &mut [ColumnMapping], diagnostics: &mut Vec<Diagnostic>) {
    let mut order: Vec<usize> = (0..mappings.len())
        .filter(|&i| mappings[i].is_resolved())
        .collect();
    order.sort_by(|&a, &b| {
        mappings[b]
            .confidence()
            .partial_cmp(&mappings[a].confidence())
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut holders: BTreeMap<String, usize> = BTreeMap::new();
    for index in order {
        let Some(target) = mappings[index].target_column.clone() else {
            continue;
        };
        let key = target.to_ascii_lowercase();
        match holders.get(&key) {
            Some(&holder) => {
                let kept_source = mappings[holder].source_header.clone();
                let loser = &mut mappings[index];
                diagnostics.push(Diagnostic::ConflictFailure {
                    source_header: loser.source_header.clone(),
                    target_column: target.clone(),
                    kept_source: kept_source.clone(),
                    stage: ConflictStage::Aggregation,
                });
                loser.demote(format!("'{target}' kept for '{kept_source}'"));
            }
            None => {
                holders.insert(key, index);
            }
        }
    }
}
