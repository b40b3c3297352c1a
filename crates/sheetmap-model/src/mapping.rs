//! Column mappings and the per-sheet mapping result.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::confidence::{ConfidenceThresholds, ConfidenceTier, clamp_confidence};
use crate::diagnostics::Diagnostic;
use crate::error::EditError;
use crate::schema::TargetSchema;

/// Where a mapping decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Historical,
    Ai,
    Manual,
    Unresolved,
}

impl Provenance {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::Ai => "ai",
            Self::Manual => "manual",
            Self::Unresolved => "unresolved",
        }
    }
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    f32::deserialize(deserializer).map(clamp_confidence)
}

/// Mapping decision for one source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source_header: String,
    pub target_column: Option<String>,
    #[serde(deserialize_with = "deserialize_confidence")]
    confidence: f32,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl ColumnMapping {
    fn resolved(
        source_header: impl Into<String>,
        target_column: impl Into<String>,
        confidence: f32,
        provenance: Provenance,
    ) -> Self {
        Self {
            source_header: source_header.into(),
            target_column: Some(target_column.into()),
            confidence: clamp_confidence(confidence),
            provenance,
            rationale: None,
        }
    }

    pub fn historical(
        source_header: impl Into<String>,
        target_column: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self::resolved(
            source_header,
            target_column,
            confidence,
            Provenance::Historical,
        )
    }

    pub fn ai(
        source_header: impl Into<String>,
        target_column: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self::resolved(source_header, target_column, confidence, Provenance::Ai)
    }

    /// A user-chosen mapping, always at full confidence.
    pub fn manual(source_header: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self::resolved(source_header, target_column, 1.0, Provenance::Manual)
    }

    pub fn unresolved(source_header: impl Into<String>) -> Self {
        Self {
            source_header: source_header.into(),
            target_column: None,
            confidence: 0.0,
            provenance: Provenance::Unresolved,
            rationale: None,
        }
    }

    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_resolved(&self) -> bool {
        self.target_column.is_some()
    }

    pub fn tier(&self, thresholds: &ConfidenceThresholds) -> ConfidenceTier {
        if self.target_column.is_none() {
            return ConfidenceTier::Unresolved;
        }
        thresholds.categorize(self.confidence)
    }

    /// Drop the target, leaving the column unresolved at zero confidence.
    pub fn demote(&mut self, rationale: impl Into<String>) {
        self.target_column = None;
        self.confidence = 0.0;
        self.provenance = Provenance::Unresolved;
        self.rationale = Some(rationale.into());
    }
}

/// Non-fatal warnings about the mapping as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingWarning {
    /// A required target column has no source column.
    UnmetRequired { target_column: String },
}

/// Result of mapping one sheet against one target schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResult {
    pub sheet_name: String,
    pub target_table: String,
    /// One entry per source column, in sheet order.
    pub mappings: Vec<ColumnMapping>,
    #[serde(default)]
    pub warnings: Vec<MappingWarning>,
    #[serde(default)]
    pub overall_confidence: f32,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl MappingResult {
    /// Build a result and compute warnings and overall confidence.
    pub fn new(
        sheet_name: impl Into<String>,
        schema: &TargetSchema,
        mappings: Vec<ColumnMapping>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let mut result = Self {
            sheet_name: sheet_name.into(),
            target_table: schema.table().to_string(),
            mappings,
            warnings: Vec::new(),
            overall_confidence: 0.0,
            diagnostics,
        };
        result.refresh(schema);
        result
    }

    /// Recompute unmet-required warnings and overall confidence.
    ///
    /// Overall confidence is the mean over required targets (zero for an
    /// unassigned one). Without required targets it is the mean over mapped
    /// columns, or zero when nothing is mapped.
    pub fn refresh(&mut self, schema: &TargetSchema) {
        self.warnings = schema
            .required()
            .filter(|column| self.mapping_for_target(&column.name).is_none())
            .map(|column| MappingWarning::UnmetRequired {
                target_column: column.name.clone(),
            })
            .collect();

        let required = schema.required_count();
        let overall = if required > 0 {
            let sum: f32 = schema
                .required()
                .map(|column| {
                    self.mapping_for_target(&column.name)
                        .map_or(0.0, ColumnMapping::confidence)
                })
                .sum();
            sum / required as f32
        } else {
            let mapped: Vec<f32> = self
                .mappings
                .iter()
                .filter(|m| m.is_resolved())
                .map(ColumnMapping::confidence)
                .collect();
            if mapped.is_empty() {
                0.0
            } else {
                mapped.iter().sum::<f32>() / mapped.len() as f32
            }
        };
        self.overall_confidence = clamp_confidence(overall);
    }

    pub fn mapping(&self, source_header: &str) -> Option<&ColumnMapping> {
        self.mappings
            .iter()
            .find(|m| m.source_header == source_header)
    }

    /// The mapping currently holding `target`, compared case-insensitively.
    pub fn mapping_for_target(&self, target: &str) -> Option<&ColumnMapping> {
        self.mappings.iter().find(|m| {
            m.target_column
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(target))
        })
    }

    /// Assign `target` to `source_header` as a manual mapping.
    ///
    /// With `force`, a different column currently holding the target is
    /// demoted to unresolved; otherwise the edit is rejected.
    pub fn assign_manual(
        &mut self,
        schema: &TargetSchema,
        source_header: &str,
        target: &str,
        force: bool,
    ) -> Result<(), EditError> {
        let canonical = schema
            .column(target)
            .map(|c| c.name.clone())
            .ok_or_else(|| EditError::TargetNotInSchema(target.to_string()))?;
        let index = self
            .mappings
            .iter()
            .position(|m| m.source_header == source_header)
            .ok_or_else(|| EditError::SourceNotFound(source_header.to_string()))?;

        if let Some(holder) = self
            .mapping_for_target(&canonical)
            .filter(|m| m.source_header != source_header)
            .map(|m| m.source_header.clone())
        {
            if !force {
                return Err(EditError::TargetAlreadyAssigned {
                    target: canonical,
                    holder,
                });
            }
            if let Some(existing) = self
                .mappings
                .iter_mut()
                .find(|m| m.source_header == holder)
            {
                existing.demote(format!("target '{canonical}' reassigned to '{source_header}'"));
            }
        }

        self.mappings[index] = ColumnMapping::manual(source_header, canonical);
        self.refresh(schema);
        Ok(())
    }

    /// Remove the target of `source_header`. Returns whether it had one.
    pub fn clear(&mut self, schema: &TargetSchema, source_header: &str) -> Result<bool, EditError> {
        let mapping = self
            .mappings
            .iter_mut()
            .find(|m| m.source_header == source_header)
            .ok_or_else(|| EditError::SourceNotFound(source_header.to_string()))?;
        let had_target = mapping.is_resolved();
        *mapping = ColumnMapping::unresolved(source_header).with_rationale("cleared during review");
        self.refresh(schema);
        Ok(had_target)
    }

    /// Keep only mappings at or above `min_tier`; demote the rest.
    ///
    /// Returns how many mappings were demoted.
    pub fn retain_at_or_above(
        &mut self,
        schema: &TargetSchema,
        min_tier: ConfidenceTier,
        thresholds: &ConfidenceThresholds,
    ) -> usize {
        let mut demoted = 0;
        for mapping in &mut self.mappings {
            if mapping.is_resolved() && mapping.tier(thresholds) < min_tier {
                mapping.demote(format!("below {} confidence", min_tier.label()));
                demoted += 1;
            }
        }
        if demoted > 0 {
            self.refresh(schema);
        }
        demoted
    }

    #[must_use]
    pub fn count_by_tier(&self, thresholds: &ConfidenceThresholds) -> BTreeMap<ConfidenceTier, usize> {
        let mut counts = BTreeMap::new();
        for mapping in &self.mappings {
            *counts.entry(mapping.tier(thresholds)).or_insert(0) += 1;
        }
        counts
    }

    /// Mappings that carry a target, in sheet order.
    pub fn resolved(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.mappings.iter().filter(|m| m.is_resolved())
    }

    /// True when no two mappings share a target.
    pub fn has_unique_targets(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.resolved().all(|m| {
            m.target_column
                .as_deref()
                .is_some_and(|t| seen.insert(t.to_ascii_lowercase()))
        })
    }
}
