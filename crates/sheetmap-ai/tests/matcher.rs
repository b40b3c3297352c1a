use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sheetmap_ai::{
    AiConfig, AiError, AiMatcher, CompletionRequest, KnownHeaders, LanguageModel, RetryPolicy,
};
use sheetmap_model::{
    Column, ConflictStage, DataKind, Diagnostic, Provenance, Sheet, TargetColumn, TargetSchema,
};

/// Replays canned replies in order and counts calls.
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    calls: Mutex<u32>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<String, AiError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, _request: &CompletionRequest) -> Result<String, AiError> {
        *self.calls.lock().unwrap() += 1;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AiError::EmptyResponse))
    }
}

fn matcher(model: Arc<ScriptedModel>, attempts: u32) -> AiMatcher {
    let config = AiConfig {
        retry: RetryPolicy::immediate(attempts),
        ..AiConfig::default()
    };
    AiMatcher::new(model, config)
}

fn schema() -> TargetSchema {
    TargetSchema::new(
        "customers",
        vec![
            TargetColumn::new("email", DataKind::Text).required(),
            TargetColumn::new("full_name", DataKind::Text),
            TargetColumn::new("phone", DataKind::Text),
        ],
    )
    .unwrap()
}

#[test]
fn valid_reply_maps_columns_in_input_order() {
    let model = ScriptedModel::new(vec![Ok(r#"```json
{"mappings": [
  {"source_header": "Tel", "target_column": "phone", "rationale": "digits", "confidence": 0.8},
  {"source_header": "Contact", "target_column": "email", "confidence": 0.9}
]}
```"#
        .to_string())]);
    let contact = Column::new("Contact").with_samples(["a@x.io"]);
    let tel = Column::new("Tel");
    let resolution =
        matcher(model.clone(), 3).resolve(&[&contact, &tel], &schema(), &KnownHeaders::new());

    assert_eq!(model.calls(), 1);
    assert_eq!(resolution.mappings[0].source_header, "Contact");
    assert_eq!(resolution.mappings[0].target_column.as_deref(), Some("email"));
    assert_eq!(resolution.mappings[0].provenance, Provenance::Ai);
    assert_eq!(resolution.mappings[1].rationale.as_deref(), Some("digits"));
    assert!(resolution.diagnostics.is_empty());
}

#[test]
fn second_claim_on_a_target_loses() {
    let model = ScriptedModel::new(vec![Ok(r#"{"mappings": [
        {"source_header": "Mail", "target_column": "email", "confidence": 0.6},
        {"source_header": "E-mail", "target_column": "email", "confidence": 0.95}
    ]}"#
    .to_string())]);
    let mail = Column::new("Mail");
    let email = Column::new("E-mail");
    let resolution = matcher(model, 1).resolve(&[&email, &mail], &schema(), &KnownHeaders::new());

    let kept = &resolution.mappings[1];
    assert_eq!(kept.source_header, "Mail");
    assert_eq!(kept.target_column.as_deref(), Some("email"));
    assert!(!resolution.mappings[0].is_resolved());
    assert_eq!(
        resolution.diagnostics,
        vec![Diagnostic::ConflictFailure {
            source_header: "E-mail".to_string(),
            target_column: "email".to_string(),
            kept_source: "Mail".to_string(),
            stage: ConflictStage::AiResponse,
        }]
    );
}

#[test]
fn hallucinated_target_becomes_validation_failure() {
    let model = ScriptedModel::new(vec![Ok(
        r#"{"mappings": [{"source_header": "Zip", "target_column": "postal_code"}]}"#.to_string(),
    )]);
    let zip = Column::new("Zip");
    let resolution = matcher(model, 1).resolve(&[&zip], &schema(), &KnownHeaders::new());

    assert!(!resolution.mappings[0].is_resolved());
    assert_eq!(resolution.mappings[0].confidence(), 0.0);
    assert!(matches!(
        &resolution.diagnostics[0],
        Diagnostic::ValidationFailure { proposed_target, .. } if proposed_target == "postal_code"
    ));
}

#[test]
fn malformed_reply_is_retried_then_succeeds() {
    let model = ScriptedModel::new(vec![
        Ok("I think Tel is a phone number.".to_string()),
        Err(AiError::Api {
            status: 503,
            message: "busy".to_string(),
        }),
        Ok(r#"{"mappings": [{"source_header": "Tel", "target_column": "phone"}]}"#.to_string()),
    ]);
    let tel = Column::new("Tel");
    let resolution = matcher(model.clone(), 3).resolve(&[&tel], &schema(), &KnownHeaders::new());

    assert_eq!(model.calls(), 3);
    assert_eq!(resolution.mappings[0].target_column.as_deref(), Some("phone"));
}

#[test]
fn brace_snippet_in_prose_does_not_spend_a_retry() {
    let model = ScriptedModel::new(vec![Ok(
        "Each entry looks like {source_header, target_column}. Answer:\n\
{\"mappings\": [{\"source_header\": \"Mail\", \"target_column\": \"email\"}]}"
            .to_string(),
    )]);
    let mail = Column::new("Mail");
    let resolution = matcher(model.clone(), 2).resolve(&[&mail], &schema(), &KnownHeaders::new());

    assert_eq!(model.calls(), 1);
    assert_eq!(resolution.mappings[0].target_column.as_deref(), Some("email"));
    assert!(resolution.diagnostics.is_empty());
}

#[test]
fn exhausted_retries_leave_batch_unresolved() {
    let model = ScriptedModel::new(Vec::new());
    let a = Column::new("A");
    let b = Column::new("B");
    let resolution = matcher(model.clone(), 3).resolve(&[&a, &b], &schema(), &KnownHeaders::new());

    assert_eq!(model.calls(), 3);
    assert!(resolution.mappings.iter().all(|m| !m.is_resolved()));
    assert!(matches!(
        &resolution.diagnostics[..],
        [Diagnostic::MatchingFailure { headers, attempts: 3, .. }] if headers.len() == 2
    ));
}

#[test]
fn non_retryable_error_stops_immediately() {
    let model = ScriptedModel::new(vec![Err(AiError::Api {
        status: 401,
        message: "bad key".to_string(),
    })]);
    let a = Column::new("A");
    let resolution = matcher(model.clone(), 5).resolve(&[&a], &schema(), &KnownHeaders::new());

    assert_eq!(model.calls(), 1);
    assert!(matches!(
        resolution.diagnostics[0],
        Diagnostic::MatchingFailure { attempts: 1, .. }
    ));
}

#[test]
fn empty_batch_makes_no_call() {
    let model = ScriptedModel::new(Vec::new());
    let resolution = matcher(model.clone(), 3).resolve(&[], &schema(), &KnownHeaders::new());
    assert_eq!(model.calls(), 0);
    assert!(resolution.mappings.is_empty());
}

#[test]
fn sheet_judgment_is_parsed() {
    let model = ScriptedModel::new(vec![Ok(
        r#"{"sheets": [{"sheet": "Q1", "present": ["email"]}, {"sheet": "Q2", "present": []}]}"#
            .to_string(),
    )]);
    let q1 = Sheet::new("Q1", 5).with_headers(["Contact"]);
    let q2 = Sheet::new("Q2", 5).with_headers(["Notes"]);
    let judgment = matcher(model, 1)
        .judge_sheets(&[&q1, &q2], &schema(), &KnownHeaders::new())
        .unwrap();
    assert_eq!(judgment["Q1"], vec!["email".to_string()]);
    assert!(judgment["Q2"].is_empty());
}
