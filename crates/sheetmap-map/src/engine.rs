//! The mapping engine: sheet selection, column matching and confirmation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sheetmap_ai::AiMatcher;
use sheetmap_history::{HistoryIndex, HistoryStore};
use sheetmap_model::{
    Column, Diagnostic, HistoricalRecord, HistoryKey, MappingResult, Sheet, TargetSchema, Workbook,
};
use tracing::{debug, info, warn};

use crate::aggregate::{ColumnProposals, ConfidenceAggregator};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::historical::{HistoricalMatcher, known_headers};
use crate::normalize::Normalizer;
use crate::selector::{SheetSelection, SheetSelector};

/// A workbook mapping: which sheet was chosen and how its columns map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookMapping {
    pub selection: SheetSelection,
    pub result: MappingResult,
}

/// What a confirmation wrote to history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmSummary {
    /// Distinct keys written.
    pub recorded: usize,
    /// Resolved mappings not written (blank header or repeated key).
    pub skipped: usize,
}

/// Maps workbooks onto a target schema using history and an optional AI matcher.
///
/// Cloning is cheap; clones share the same history store.
#[derive(Clone)]
pub struct MappingEngine {
    history: Arc<Mutex<Box<dyn HistoryStore>>>,
    ai: Option<AiMatcher>,
    config: EngineConfig,
    normalizer: Normalizer,
}

impl std::fmt::Debug for MappingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingEngine")
            .field("ai", &self.ai)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MappingEngine {
    pub fn new(history: Box<dyn HistoryStore>, config: EngineConfig) -> Self {
        let normalizer = Normalizer::new(config.normalizer.clone());
        Self {
            history: Arc::new(Mutex::new(history)),
            ai: None,
            config,
            normalizer,
        }
    }

    #[must_use]
    pub fn with_ai(mut self, ai: AiMatcher) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    fn lock_history(&self) -> MutexGuard<'_, Box<dyn HistoryStore>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Durable history records, ordered by key.
    pub fn history_records(&self) -> sheetmap_history::Result<Vec<HistoricalRecord>> {
        self.lock_history().load()
    }

    /// Load a read-only history snapshot. A failed load yields empty memory
    /// plus a diagnostic.
    fn snapshot(&self) -> (HistoryIndex, Vec<Diagnostic>) {
        match self.history_records() {
            Ok(records) => {
                let index = HistoryIndex::new(records);
                debug!(record_count = index.len(), "history snapshot loaded");
                (index, Vec::new())
            }
            Err(err) => {
                warn!(error = %err, "history unavailable, matching without memory");
                (
                    HistoryIndex::default(),
                    vec![Diagnostic::HistoryUnavailable {
                        message: err.user_message(),
                    }],
                )
            }
        }
    }

    /// Pick the sheet most likely to hold `schema`'s table.
    pub fn select_sheet(&self, workbook: &Workbook, schema: &TargetSchema) -> Result<SheetSelection> {
        let (index, _) = self.snapshot();
        let selector = SheetSelector::new(
            &self.config.selector,
            &self.normalizer,
            &index,
            self.ai.as_ref(),
        );
        Ok(selector.select(workbook, schema)?)
    }

    /// Select a sheet, then map its columns.
    pub fn map_workbook(&self, workbook: &Workbook, schema: &TargetSchema) -> Result<WorkbookMapping> {
        let (index, diagnostics) = self.snapshot();
        let selector = SheetSelector::new(
            &self.config.selector,
            &self.normalizer,
            &index,
            self.ai.as_ref(),
        );
        let selection = selector.select(workbook, schema)?;
        let sheet = workbook
            .sheets
            .get(selection.index)
            .ok_or_else(|| EngineError::SheetNotFound(selection.name.clone()))?;
        let result = self.map_with_index(sheet, schema, &index, diagnostics);
        Ok(WorkbookMapping { selection, result })
    }

    /// Map a caller-chosen sheet, bypassing selection.
    pub fn map_sheet_named(
        &self,
        workbook: &Workbook,
        sheet_name: &str,
        schema: &TargetSchema,
    ) -> Result<MappingResult> {
        let (_, sheet) = workbook
            .sheet(sheet_name)
            .ok_or_else(|| EngineError::SheetNotFound(sheet_name.to_string()))?;
        info!(sheet = %sheet.name, "mapping caller-selected sheet");
        Ok(self.map_sheet(sheet, schema))
    }

    /// Map the columns of one sheet.
    pub fn map_sheet(&self, sheet: &Sheet, schema: &TargetSchema) -> MappingResult {
        let (index, diagnostics) = self.snapshot();
        self.map_with_index(sheet, schema, &index, diagnostics)
    }

    /// Run [`Self::map_workbook`] on tokio's blocking pool.
    pub async fn map_workbook_async(
        &self,
        workbook: Workbook,
        schema: TargetSchema,
    ) -> Result<WorkbookMapping> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.map_workbook(&workbook, &schema))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?
    }

    fn map_with_index(
        &self,
        sheet: &Sheet,
        schema: &TargetSchema,
        index: &HistoryIndex,
        mut diagnostics: Vec<Diagnostic>,
    ) -> MappingResult {
        let matcher = HistoricalMatcher::new(index, &self.config.historical);
        let mut proposals = Vec::with_capacity(sheet.columns.len());
        let mut batch: Vec<(usize, &Column)> = Vec::new();

        for (position, column) in sheet.columns.iter().enumerate() {
            let normalized = self.normalizer.normalize(&column.header);
            let mut entry = ColumnProposals::new(&column.header);
            if normalized.is_empty() {
                debug!(position, "blank header left unresolved");
                proposals.push(entry);
                continue;
            }
            match matcher.match_header(&normalized, schema.table()) {
                Some(mut found) => {
                    // History may name a column the schema has since renamed or dropped.
                    let Some(target) = schema.column(&found.target_column) else {
                        warn!(
                            header = %column.header,
                            target = %found.target_column,
                            "remembered target not in schema, ignoring history"
                        );
                        diagnostics.push(Diagnostic::ValidationFailure {
                            source_header: column.header.clone(),
                            proposed_target: found.target_column,
                        });
                        batch.push((position, column));
                        proposals.push(entry);
                        continue;
                    };
                    found.target_column.clone_from(&target.name);
                    debug!(
                        header = %column.header,
                        target = %found.target_column,
                        confidence = found.confidence,
                        fuzzy = found.is_fuzzy(),
                        "historical match"
                    );
                    if matcher.wants_second_opinion(&found) {
                        batch.push((position, column));
                    }
                    entry.historical = Some(found.into_mapping(&column.header));
                }
                None => batch.push((position, column)),
            }
            proposals.push(entry);
        }

        match &self.ai {
            Some(ai) if !batch.is_empty() => {
                let columns: Vec<&Column> = batch.iter().map(|(_, c)| *c).collect();
                let resolution = ai.resolve(&columns, schema, &known_headers(index, schema));
                for ((position, _), mapping) in batch.iter().zip(resolution.mappings) {
                    proposals[*position].ai = Some(mapping);
                }
                diagnostics.extend(resolution.diagnostics);
            }
            None if !batch.is_empty() => {
                debug!(column_count = batch.len(), "no AI matcher configured, columns stay unresolved");
            }
            _ => {}
        }

        ConfidenceAggregator::new(&self.config.aggregator).aggregate(
            sheet,
            schema,
            proposals,
            diagnostics,
        )
    }

    /// Record every resolved mapping of `result` in history.
    pub fn confirm(&self, result: &MappingResult) -> Result<ConfirmSummary> {
        self.confirm_at(result, Utc::now())
    }

    /// [`Self::confirm`] with an explicit timestamp.
    ///
    /// Each distinct `(normalized header, table)` key is written once; the
    /// first mapping in sheet order decides its target. On failure the staged
    /// batch is discarded and durable history is unchanged.
    pub fn confirm_at(&self, result: &MappingResult, when: DateTime<Utc>) -> Result<ConfirmSummary> {
        let mut accepted: BTreeMap<HistoryKey, String> = BTreeMap::new();
        let mut skipped = 0usize;
        for mapping in result.resolved() {
            let Some(target) = mapping.target_column.as_ref() else {
                continue;
            };
            let normalized = self.normalizer.normalize(&mapping.source_header);
            if normalized.is_empty() {
                skipped += 1;
                continue;
            }
            let key = HistoryKey::new(normalized, &result.target_table);
            if accepted.contains_key(&key) {
                skipped += 1;
                continue;
            }
            accepted.insert(key, target.clone());
        }

        let mut store = self.lock_history();
        for (key, target) in accepted {
            store.upsert(HistoricalRecord::first_seen(key, target, when));
        }
        match store.flush() {
            Ok(recorded) => {
                info!(
                    sheet = %result.sheet_name,
                    target_table = %result.target_table,
                    recorded,
                    skipped,
                    "confirmed mappings recorded"
                );
                Ok(ConfirmSummary { recorded, skipped })
            }
            Err(err) => {
                store.discard();
                warn!(error = %err, "confirmation failed, staged history discarded");
                Err(err.into())
            }
        }
    }
}
