use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use sheetmap_ai::{AiConfig, AiError, AiMatcher, CompletionRequest, LanguageModel, RetryPolicy};
use sheetmap_history::{HistoryError, HistoryStore, JsonHistoryStore, MemoryHistoryStore};
use sheetmap_model::{
    Column, ConfidenceThresholds, ConfidenceTier, DataKind, Diagnostic, HistoricalRecord,
    HistoryKey, MappingWarning, Provenance, Sheet, TargetColumn, TargetSchema, Workbook,
};
use sheetmap_map::{EngineConfig, EngineError, MappingEngine};
use tempfile::tempdir;

/// Replays canned replies and keeps every prompt it saw.
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<String, AiError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, request: &CompletionRequest) -> Result<String, AiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(AiError::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
        })
    }
}

fn ai(model: Arc<ScriptedModel>) -> AiMatcher {
    AiMatcher::new(
        model,
        AiConfig {
            retry: RetryPolicy::immediate(3),
            ..AiConfig::default()
        },
    )
}

fn record(header: &str, table: &str, target: &str, count: u64) -> HistoricalRecord {
    let when = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut record = HistoricalRecord::first_seen(HistoryKey::new(header, table), target, when);
    record.occurrence_count = count;
    record
}

fn people_schema() -> TargetSchema {
    TargetSchema::new(
        "people",
        vec![
            TargetColumn::new("first_name", DataKind::Text).required(),
            TargetColumn::new("last_name", DataKind::Text).required(),
            TargetColumn::new("email", DataKind::Text).required(),
        ],
    )
    .unwrap()
}

fn people_workbook() -> Workbook {
    Workbook::new(vec![
        Sheet::new("People", 20)
            .with_column(Column::new("First Name").with_samples(["Ada"]))
            .with_column(Column::new("Last Name").with_samples(["Lovelace"]))
            .with_column(Column::new("Email").with_samples(["ada@example.com"])),
    ])
}

fn people_history() -> MemoryHistoryStore {
    MemoryHistoryStore::with_records([
        record("first name", "people", "first_name", 5),
        record("last name", "people", "last_name", 3),
    ])
}

#[test]
fn history_and_ai_together_cover_required_columns() {
    let model = ScriptedModel::new(vec![Ok(r#"{"mappings": [
        {"source_header": "Email", "target_column": "email", "rationale": "addresses", "confidence": 0.9}
    ]}"#
    .to_string())]);
    let engine = MappingEngine::new(Box::new(people_history()), EngineConfig::default())
        .with_ai(ai(model.clone()));

    let mapped = engine
        .map_workbook(&people_workbook(), &people_schema())
        .unwrap();
    let result = &mapped.result;
    let thresholds = ConfidenceThresholds::default();

    for (header, target) in [("First Name", "first_name"), ("Last Name", "last_name")] {
        let mapping = result.mapping(header).unwrap();
        assert_eq!(mapping.target_column.as_deref(), Some(target));
        assert_eq!(mapping.provenance, Provenance::Historical);
        assert_eq!(mapping.tier(&thresholds), ConfidenceTier::High);
    }
    let email = result.mapping("Email").unwrap();
    assert_eq!(email.provenance, Provenance::Ai);
    assert_eq!(email.target_column.as_deref(), Some("email"));
    assert!(result.warnings.is_empty());

    // Only the unresolved column was sent, and only once.
    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].user.contains("\"Email\""));
    assert!(!requests[0].user.contains("\"First Name\""));
}

#[test]
fn failing_ai_leaves_columns_unresolved_with_diagnostic() {
    let model = ScriptedModel::new(Vec::new());
    let history = MemoryHistoryStore::with_records([record("first name", "people", "first_name", 5)]);
    let engine =
        MappingEngine::new(Box::new(history), EngineConfig::default()).with_ai(ai(model.clone()));

    let mapped = engine
        .map_workbook(&people_workbook(), &people_schema())
        .unwrap();
    assert_eq!(mapped.selection.name, "People");

    let result = &mapped.result;
    for header in ["Last Name", "Email"] {
        let mapping = result.mapping(header).unwrap();
        assert_eq!(mapping.provenance, Provenance::Unresolved);
        assert_eq!(mapping.confidence(), 0.0);
    }
    assert_eq!(
        result.mapping("First Name").unwrap().provenance,
        Provenance::Historical
    );
    assert!(result.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::MatchingFailure { attempts: 3, headers, .. } if headers.len() == 2
    )));
    assert_eq!(
        result.warnings,
        vec![
            MappingWarning::UnmetRequired {
                target_column: "last_name".to_string()
            },
            MappingWarning::UnmetRequired {
                target_column: "email".to_string()
            },
        ]
    );
    assert_eq!(model.requests().len(), 3);
}

#[test]
fn selects_the_sheet_with_most_required_columns() {
    let workbook = Workbook::new(vec![
        Sheet::new("Summary", 5).with_headers(["Region", "Total"]),
        Sheet::new("Accounts", 240).with_headers([
            "Account Number",
            "Current Balance",
            "Client Name",
            "Status",
        ]),
        Sheet::new("Notes", 12).with_headers(["Account Number", "Comment"]),
    ]);
    let engine = MappingEngine::new(Box::new(MemoryHistoryStore::new()), EngineConfig::default());

    let selection = engine
        .select_sheet(&workbook, &TargetSchema::default_accounts())
        .unwrap();
    assert_eq!(selection.index, 1);
    assert_eq!(selection.name, "Accounts");
    assert!(selection.score >= 0.8);
    assert_eq!(selection.candidates.len(), 3);
}

#[test]
fn identification_failure_carries_candidate_scores() {
    let workbook = Workbook::new(vec![
        Sheet::new("Cover", 0).with_headers(["Account Number", "Balance", "Client Name"]),
        Sheet::new("Notes", 4).with_headers(["Comment"]),
    ]);
    let engine = MappingEngine::new(Box::new(MemoryHistoryStore::new()), EngineConfig::default());

    let err = engine
        .map_workbook(&workbook, &TargetSchema::default_accounts())
        .unwrap_err();
    let EngineError::Identification(failure) = err else {
        panic!("expected identification failure, got {err}");
    };
    assert_eq!(failure.candidates.len(), 1);
    assert_eq!(failure.candidates[0].name, "Notes");
    assert_eq!(failure.excluded[0].name, "Cover");
}

#[test]
fn ai_judgment_breaks_selection_ties() {
    let model = ScriptedModel::new(vec![Ok(r#"{"sheets": [
        {"sheet": "Q1", "present": []},
        {"sheet": "Q2", "present": ["first_name", "last_name", "email"]}
    ]}"#
    .to_string())]);
    let workbook = Workbook::new(vec![
        Sheet::new("Q1", 3).with_headers(["Email", "Note"]),
        Sheet::new("Q2", 3).with_headers(["Email", "Given", "Surname"]),
    ]);
    let engine = MappingEngine::new(Box::new(MemoryHistoryStore::new()), EngineConfig::default())
        .with_ai(ai(model));

    let selection = engine.select_sheet(&workbook, &people_schema()).unwrap();
    assert_eq!(selection.name, "Q2");
    assert!(selection.candidates[1].ai_assisted);
}

#[test]
fn failed_ai_judgment_keeps_lexical_scores() {
    let model = ScriptedModel::new(Vec::new());
    let workbook = Workbook::new(vec![
        Sheet::new("Q1", 3).with_headers(["First Name", "Last Name"]),
        Sheet::new("Q2", 3).with_headers(["First Name", "Last Name"]),
    ]);
    let engine = MappingEngine::new(Box::new(MemoryHistoryStore::new()), EngineConfig::default())
        .with_ai(ai(model));

    let selection = engine.select_sheet(&workbook, &people_schema()).unwrap();
    assert_eq!(selection.index, 0);
    assert!(selection.candidates.iter().all(|c| !c.ai_assisted));
}

#[test]
fn weak_fuzzy_history_gets_ai_second_opinion() {
    let model = ScriptedModel::new(vec![Ok(r#"{"mappings": [
        {"source_header": "Cust E-mail", "target_column": "email", "confidence": 0.95}
    ]}"#
    .to_string())]);
    let schema = TargetSchema::new(
        "customers",
        vec![
            TargetColumn::new("email", DataKind::Text),
            TargetColumn::new("contact", DataKind::Text),
        ],
    )
    .unwrap();
    let history = MemoryHistoryStore::with_records([record("cust email", "customers", "contact", 1)]);
    let engine =
        MappingEngine::new(Box::new(history), EngineConfig::default()).with_ai(ai(model.clone()));
    let sheet = Sheet::new("Data", 3).with_headers(["Cust E-mail"]);

    let result = engine.map_sheet(&sheet, &schema);
    let mapping = result.mapping("Cust E-mail").unwrap();
    assert_eq!(mapping.target_column.as_deref(), Some("email"));
    assert_eq!(mapping.provenance, Provenance::Ai);
    assert!(matches!(
        &result.diagnostics[0],
        Diagnostic::Override { historical_target, .. } if historical_target == "contact"
    ));
    assert_eq!(model.requests().len(), 1);
}

#[test]
fn remembered_target_missing_from_schema_is_ignored() {
    let model = ScriptedModel::new(vec![Ok(r#"{"mappings": [
        {"source_header": "Given Name", "target_column": "first_name", "confidence": 0.85}
    ]}"#
    .to_string())]);
    let schema = TargetSchema::new(
        "people",
        vec![
            TargetColumn::new("first_name", DataKind::Text).required(),
            TargetColumn::new("email", DataKind::Text),
        ],
    )
    .unwrap();
    let history = MemoryHistoryStore::with_records([
        record("given name", "people", "fname", 9),
        record("e mail", "people", "EMAIL", 3),
    ]);
    let engine =
        MappingEngine::new(Box::new(history), EngineConfig::default()).with_ai(ai(model.clone()));
    let sheet = Sheet::new("Data", 3).with_headers(["Given Name", "E-Mail"]);

    let result = engine.map_sheet(&sheet, &schema);
    let given = result.mapping("Given Name").unwrap();
    assert_eq!(given.target_column.as_deref(), Some("first_name"));
    assert_eq!(given.provenance, Provenance::Ai);
    assert_eq!(
        result.diagnostics,
        vec![Diagnostic::ValidationFailure {
            source_header: "Given Name".to_string(),
            proposed_target: "fname".to_string(),
        }]
    );

    // Stored spelling differs from the schema's; the schema's wins.
    let email = result.mapping("E-Mail").unwrap();
    assert_eq!(email.target_column.as_deref(), Some("email"));
    assert_eq!(email.provenance, Provenance::Historical);

    // The prompt carries remembered headers for live targets only.
    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].user.contains(r#"previously mapped from "e mail""#));
    assert!(!requests[0].user.contains("fname"));

    // Confirming retargets the stale record instead of reinforcing it.
    engine.confirm(&result).unwrap();
    let records = engine.history_records().unwrap();
    let given_name = records
        .iter()
        .find(|r| r.normalized_header == "given name")
        .unwrap();
    assert_eq!(given_name.target_column, "first_name");
    assert_eq!(given_name.occurrence_count, 10);
}

#[test]
fn confirm_twice_increments_once_per_confirmation() {
    let engine = MappingEngine::new(Box::new(MemoryHistoryStore::new()), EngineConfig::default());
    let schema = people_schema();
    let mut result = engine.map_sheet(&people_workbook().sheets[0], &schema);
    result.assign_manual(&schema, "Email", "email", false).unwrap();
    result.assign_manual(&schema, "First Name", "first_name", false).unwrap();

    let first = engine.confirm(&result).unwrap();
    assert_eq!(first.recorded, 2);
    engine.confirm(&result).unwrap();

    let records = engine.history_records().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.occurrence_count == 2));
    assert!(records.iter().any(|r| r.normalized_header == "first name"));
}

#[test]
fn confirmed_mappings_feed_the_next_run() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.json");
    let schema = people_schema();
    let workbook = people_workbook();

    let engine = MappingEngine::new(Box::new(JsonHistoryStore::new(&path)), EngineConfig::default());
    let mut result = engine.map_sheet(&workbook.sheets[0], &schema);
    assert!(result.resolved().next().is_none());
    for (header, target) in [("First Name", "first_name"), ("Last Name", "last_name"), ("Email", "email")] {
        result.assign_manual(&schema, header, target, false).unwrap();
    }
    engine
        .confirm_at(&result, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        .unwrap();

    let fresh = MappingEngine::new(Box::new(JsonHistoryStore::new(&path)), EngineConfig::default());
    let rerun = fresh.map_workbook(&workbook, &schema).unwrap().result;
    assert!(rerun.warnings.is_empty());
    assert!(rerun.mappings.iter().all(|m| m.provenance == Provenance::Historical));
}

#[test]
fn confirm_dedupes_headers_that_normalize_alike() {
    let engine = MappingEngine::new(Box::new(MemoryHistoryStore::new()), EngineConfig::default());
    let schema = people_schema();
    let sheet = Sheet::new("Dupes", 2).with_headers(["E-mail", "e mail"]);
    let mut result = engine.map_sheet(&sheet, &schema);
    result.assign_manual(&schema, "E-mail", "email", false).unwrap();
    result.assign_manual(&schema, "e mail", "last_name", false).unwrap();

    let summary = engine.confirm(&result).unwrap();
    assert_eq!(summary.recorded, 1);
    assert_eq!(summary.skipped, 1);
    let records = engine.history_records().unwrap();
    assert_eq!(records[0].target_column, "email");
    assert_eq!(records[0].occurrence_count, 1);
}

/// Store whose flush always fails; counts discards.
struct BrokenStore {
    inner: MemoryHistoryStore,
    discards: Arc<Mutex<u32>>,
}

impl HistoryStore for BrokenStore {
    fn load(&self) -> sheetmap_history::Result<Vec<HistoricalRecord>> {
        self.inner.load()
    }

    fn upsert(&mut self, record: HistoricalRecord) {
        self.inner.upsert(record);
    }

    fn flush(&mut self) -> sheetmap_history::Result<usize> {
        Err(HistoryError::Unavailable {
            reason: "disk full".to_string(),
        })
    }

    fn discard(&mut self) {
        *self.discards.lock().unwrap() += 1;
        self.inner.discard();
    }

    fn staged_len(&self) -> usize {
        self.inner.staged_len()
    }
}

#[test]
fn failed_confirmation_discards_staged_batch() {
    let discards = Arc::new(Mutex::new(0));
    let store = BrokenStore {
        inner: people_history(),
        discards: discards.clone(),
    };
    let engine = MappingEngine::new(Box::new(store), EngineConfig::default());
    let schema = people_schema();
    let result = engine.map_sheet(&people_workbook().sheets[0], &schema);

    let err = engine.confirm(&result).unwrap_err();
    assert!(matches!(err, EngineError::History(HistoryError::Unavailable { .. })));
    assert_eq!(*discards.lock().unwrap(), 1);

    assert_eq!(
        engine.history_records().unwrap(),
        people_history().load().unwrap()
    );
}

/// Store whose load always fails.
struct UnreadableStore;

impl HistoryStore for UnreadableStore {
    fn load(&self) -> sheetmap_history::Result<Vec<HistoricalRecord>> {
        Err(HistoryError::Unavailable {
            reason: "locked".to_string(),
        })
    }

    fn upsert(&mut self, _record: HistoricalRecord) {}

    fn flush(&mut self) -> sheetmap_history::Result<usize> {
        Ok(0)
    }

    fn discard(&mut self) {}

    fn staged_len(&self) -> usize {
        0
    }
}

#[test]
fn unreadable_history_degrades_to_empty_memory() {
    let engine = MappingEngine::new(Box::new(UnreadableStore), EngineConfig::default());
    let mapped = engine
        .map_workbook(&people_workbook(), &people_schema())
        .unwrap();
    assert!(matches!(
        mapped.result.diagnostics[0],
        Diagnostic::HistoryUnavailable { .. }
    ));
    assert!(mapped.result.resolved().next().is_none());
}

#[test]
fn named_sheet_bypasses_selection() {
    let workbook = Workbook::new(vec![
        Sheet::new("Notes", 4).with_headers(["Comment"]),
        Sheet::new("Raw", 4).with_headers(["First Name"]),
    ]);
    let engine = MappingEngine::new(Box::new(people_history()), EngineConfig::default());

    let result = engine
        .map_sheet_named(&workbook, "Raw", &people_schema())
        .unwrap();
    assert_eq!(result.sheet_name, "Raw");
    assert!(result.mapping("First Name").unwrap().is_resolved());

    let err = engine
        .map_sheet_named(&workbook, "Missing", &people_schema())
        .unwrap_err();
    assert!(matches!(err, EngineError::SheetNotFound(name) if name == "Missing"));
}

#[tokio::test]
async fn async_mapping_matches_sync_mapping() {
    let engine = MappingEngine::new(Box::new(people_history()), EngineConfig::default());
    let workbook = people_workbook();
    let schema = people_schema();

    let sync = engine.map_workbook(&workbook, &schema).unwrap();
    let asynchronous = engine
        .map_workbook_async(workbook, schema)
        .await
        .unwrap();
    assert_eq!(sync, asynchronous);
}
