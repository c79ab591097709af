//! The three-scenario correction flow driven through a `Coordinator`.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use replyparse::{
    error::{HintStoreError, Result as StoreResult},
    hints::{FormatHint, FormatHintStore, HintBackend, HintKey},
    CandidateSelector, Confidence, ConfidenceThresholds, Coordinator, CorrectionOutcome, ErrorKind,
    JsonPath, ParseStrategy, PipelineConfig, Selection, SelectionRequest,
};
use serde_json::json;

/// Scripted human: answers in order, cancels once the script runs out.
#[derive(Default)]
struct ScriptedSelector {
    answers: Mutex<VecDeque<Answer>>,
    requests: Mutex<Vec<SelectionRequest>>,
}

#[derive(Clone, Copy)]
enum Answer {
    Pick(usize, bool),
    Cancel,
}

impl ScriptedSelector {
    fn new(answers: &[Answer]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<SelectionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateSelector for ScriptedSelector {
    async fn select(&self, request: SelectionRequest) -> Selection {
        let answer = self.answers.lock().unwrap().pop_front().unwrap_or(Answer::Cancel);
        let selection = match answer {
            Answer::Pick(i, remember) => Selection::chosen(request.candidates[i].clone(), remember),
            Answer::Cancel => Selection::Cancelled,
        };
        self.requests.lock().unwrap().push(request);
        selection
    }
}

/// A human who never answers.
struct AbsentSelector;

#[async_trait]
impl CandidateSelector for AbsentSelector {
    async fn select(&self, _request: SelectionRequest) -> Selection {
        std::future::pending::<Selection>().await
    }
}

/// A persistence substrate that is down.
#[derive(Debug)]
struct DownBackend;

impl HintBackend for DownBackend {
    fn get(&self, _key: &HintKey) -> StoreResult<Option<FormatHint>> {
        Err(HintStoreError::unavailable("substrate offline"))
    }
    fn put(&self, _hint: &FormatHint) -> StoreResult<()> {
        Err(HintStoreError::unavailable("substrate offline"))
    }
    fn delete(&self, _key: &HintKey) -> StoreResult<bool> {
        Err(HintStoreError::unavailable("substrate offline"))
    }
    fn list(&self, _provider_id: &str) -> StoreResult<Vec<FormatHint>> {
        Err(HintStoreError::unavailable("substrate offline"))
    }
}

fn session(selector: Arc<dyn CandidateSelector>) -> (Coordinator, Arc<FormatHintStore>) {
    let store = Arc::new(FormatHintStore::in_memory());
    (Coordinator::new(Arc::clone(&store), selector), store)
}

fn path(s: &str) -> JsonPath {
    s.parse().unwrap()
}

fn medium_doc() -> String {
    json!({"data": {"answer": "y".repeat(300)}, "note": "short note"}).to_string()
}

/// Two weak candidates: `beta` ranks first, `alpha` second.
fn low_doc(alpha: &str) -> String {
    json!({"alpha": alpha, "beta": "second candidate text, a bit longer"}).to_string()
}

const OPENAI: &str = r#"{"choices":[{"message":{"content":"hi"}}]}"#;

#[tokio::test]
async fn test_known_schema_is_not_correctable() {
    let selector = ScriptedSelector::new(&[]);
    let (mut c, _) = session(selector.clone());
    let response = c.parse(OPENAI, Some(200), "openai", Some("gpt")).await;
    assert_eq!(response.display_text, "hi");
    assert_eq!(response.parse_strategy(), ParseStrategy::KnownSchema);
    assert!(!response.correction_available);
    assert!(!c.has_correctable_result());
    assert_eq!(c.show_raw(), None);
    assert!(!c.confirm_correction());
    assert_eq!(c.request_correction().await, CorrectionOutcome::Unavailable);
    assert!(selector.requests().is_empty());
}

#[tokio::test]
async fn test_medium_guess_then_confirm() {
    let selector = ScriptedSelector::new(&[]);
    let (mut c, store) = session(selector.clone());
    let raw = medium_doc();

    let response = c.parse(&raw, Some(200), "acme", Some("m1")).await;
    assert_eq!(response.confidence(), Confidence::Medium);
    assert_eq!(response.display_text, "y".repeat(300));
    assert!(response.correction_available);
    assert_eq!(c.show_raw(), Some(raw.as_str()));
    assert!(selector.requests().is_empty());

    assert!(c.confirm_correction());
    assert!(!c.has_correctable_result());
    assert!(!c.confirm_correction());

    let hints = store.list("acme").unwrap();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].content_path, path("data.answer"));
    assert_eq!(hints[0].model_id.as_deref(), Some("m1"));
}

#[tokio::test]
async fn test_learned_hint_round_trip() {
    let selector = ScriptedSelector::new(&[]);
    let (mut c, store) = session(selector.clone());

    c.parse(&medium_doc(), Some(200), "acme", Some("m1")).await;
    assert!(c.confirm_correction());

    let next = json!({"data": {"answer": "a different answer"}, "note": "x"}).to_string();
    let response = c.parse(&next, Some(200), "acme", Some("m1")).await;
    assert_eq!(response.display_text, "a different answer");
    assert_eq!(response.parse_strategy(), ParseStrategy::LearnedHint);
    assert_eq!(response.confidence(), Confidence::High);
    assert!(response.candidates().is_empty());
    assert!(!c.has_correctable_result());

    // Confirmed once, used once: still a single record.
    let hints = store.list("acme").unwrap();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].success_count, 2);
}

#[tokio::test]
async fn test_confirm_twice_updates_one_record() {
    let selector = ScriptedSelector::new(&[]);
    let (mut first, store) = session(selector.clone());
    let mut second = Coordinator::new(Arc::clone(&store), selector);

    first.parse(&medium_doc(), Some(200), "acme", None).await;
    second.parse(&medium_doc(), Some(200), "acme", None).await;
    assert!(first.confirm_correction());
    assert!(second.confirm_correction());

    let hints = store.list("acme").unwrap();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].success_count, 2);
}

#[tokio::test]
async fn test_low_confidence_asks_first() {
    let selector = ScriptedSelector::new(&[Answer::Pick(1, true)]);
    let (mut c, store) = session(selector.clone());
    let raw = low_doc("first candidate text");

    let response = c.parse(&raw, Some(200), "acme", Some("m1")).await;
    assert_eq!(response.display_text, "first candidate text");
    assert_eq!(response.metadata.content_path, Some(path("alpha")));

    let requests = selector.requests();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].is_recorrection);
    assert_eq!(requests[0].raw_json, raw);
    assert_eq!(requests[0].provider_id, "acme");
    assert_eq!(requests[0].model_id.as_deref(), Some("m1"));
    let offered: Vec<String> = requests[0].candidates.iter().map(|c| c.path_string()).collect();
    assert_eq!(offered, vec!["beta", "alpha"]);

    let hint = store.get("acme", Some("m1")).unwrap().unwrap();
    assert_eq!(hint.content_path, path("alpha"));

    // Same shape again resolves without asking.
    let again = c.parse(&low_doc("a brand new reply"), Some(200), "acme", Some("m1")).await;
    assert_eq!(again.display_text, "a brand new reply");
    assert_eq!(again.parse_strategy(), ParseStrategy::LearnedHint);
    assert_eq!(selector.requests().len(), 1);
}

#[tokio::test]
async fn test_selection_without_remember_persists_nothing() {
    let selector = ScriptedSelector::new(&[Answer::Pick(1, false)]);
    let (mut c, store) = session(selector);
    let response = c.parse(&low_doc("first candidate text"), Some(200), "acme", None).await;
    assert_eq!(response.display_text, "first candidate text");
    assert!(store.list("acme").unwrap().is_empty());
    assert!(c.has_correctable_result());
}

#[tokio::test]
async fn test_cancel_falls_back_to_top_candidate() {
    let selector = ScriptedSelector::new(&[Answer::Cancel]);
    let (mut c, store) = session(selector);
    let response = c.parse(&low_doc("first candidate text"), Some(200), "acme", None).await;
    assert_eq!(response.display_text, "second candidate text, a bit longer");
    assert_eq!(response.confidence(), Confidence::Low);
    assert!(response.correction_available);
    assert!(c.has_correctable_result());
    assert!(store.list("acme").unwrap().is_empty());
}

#[tokio::test]
async fn test_request_correction_learns_new_path() {
    let selector = ScriptedSelector::new(&[Answer::Cancel, Answer::Pick(1, true)]);
    let (mut c, store) = session(selector.clone());
    c.parse(&low_doc("first candidate text"), Some(200), "acme", Some("m1")).await;

    let outcome = c.request_correction().await;
    let CorrectionOutcome::Corrected(response) = outcome else {
        panic!("expected a correction, got {outcome:?}");
    };
    assert_eq!(response.display_text, "first candidate text");
    assert!(!response.correction_available);
    assert!(!c.has_correctable_result());

    let hint = store.get("acme", Some("m1")).unwrap().unwrap();
    assert_eq!(hint.content_path, path("alpha"));
    assert_eq!(hint.success_count, 1);

    let requests = selector.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].is_recorrection);
}

#[tokio::test]
async fn test_request_correction_without_remember_persists_nothing() {
    let selector = ScriptedSelector::new(&[Answer::Cancel, Answer::Pick(1, false)]);
    let (mut c, store) = session(selector);
    c.parse(&low_doc("first candidate text"), Some(200), "acme", Some("m1")).await;

    let outcome = c.request_correction().await;
    let CorrectionOutcome::Corrected(response) = outcome else {
        panic!("expected a correction, got {outcome:?}");
    };
    assert_eq!(response.display_text, "first candidate text");
    assert!(!c.has_correctable_result());
    assert!(store.list("acme").unwrap().is_empty());

    // The next exchange still asks.
    let again = c.parse(&low_doc("another reply"), Some(200), "acme", Some("m1")).await;
    assert_ne!(again.parse_strategy(), ParseStrategy::LearnedHint);
}

#[tokio::test]
async fn test_confirm_after_remembered_pick_counts_once() {
    let selector = ScriptedSelector::new(&[Answer::Pick(1, true)]);
    let (mut c, store) = session(selector);
    c.parse(&low_doc("first candidate text"), Some(200), "acme", Some("m1")).await;
    assert!(c.context().unwrap().hint_saved);

    assert!(c.confirm_correction());
    assert!(!c.has_correctable_result());

    let hints = store.list("acme").unwrap();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].content_path, path("alpha"));
    assert_eq!(hints[0].success_count, 1);
}

#[tokio::test]
async fn test_repeated_cancel_keeps_context() {
    let selector = ScriptedSelector::new(&[Answer::Cancel, Answer::Cancel, Answer::Cancel, Answer::Pick(0, false)]);
    let (mut c, _) = session(selector);
    c.parse(&low_doc("first candidate text"), Some(200), "acme", None).await;

    assert_eq!(c.request_correction().await, CorrectionOutcome::Cancelled);
    assert!(c.has_correctable_result());
    assert_eq!(c.request_correction().await, CorrectionOutcome::Cancelled);
    assert!(c.has_correctable_result());

    assert!(matches!(c.request_correction().await, CorrectionOutcome::Corrected(_)));
}

#[tokio::test]
async fn test_new_exchange_replaces_context() {
    let selector = ScriptedSelector::new(&[]);
    let (mut c, _) = session(selector);
    c.parse(&medium_doc(), Some(200), "acme", None).await;
    let first = c.context().unwrap().exchange_id;

    c.parse(&medium_doc(), Some(200), "acme", None).await;
    assert!(c.context().unwrap().exchange_id > first);

    c.parse(OPENAI, Some(200), "acme", None).await;
    assert!(!c.has_correctable_result());

    c.parse(&medium_doc(), Some(200), "acme", None).await;
    c.clear_context();
    assert!(!c.has_correctable_result());
    assert_eq!(c.show_raw(), None);
}

#[tokio::test]
async fn test_boundary_doc_scenario_depends_on_thresholds() {
    let raw = r#"{"foo":{"bar":"this could be the answer, it's long enough to look real"}}"#;

    let selector = ScriptedSelector::new(&[]);
    let (mut strict, _) = session(selector.clone());
    let response = strict.parse(raw, Some(200), "acme", None).await;
    assert_eq!(response.candidates().len(), 1);
    assert_eq!(response.candidates()[0].path_string(), "foo.bar");
    assert_eq!(selector.requests().len(), 1);

    let selector = ScriptedSelector::new(&[]);
    let lenient = PipelineConfig::default().with_thresholds(ConfidenceThresholds::new(5, 0));
    let (c, _) = session(selector.clone());
    let mut c = c.with_config(lenient);
    let response = c.parse(raw, Some(200), "acme", None).await;
    assert_eq!(response.confidence(), Confidence::Medium);
    assert_eq!(response.candidates()[0].path_string(), "foo.bar");
    assert!(selector.requests().is_empty());
}

#[tokio::test]
async fn test_session_cancel_discards_pending_selection() {
    let (mut c, store) = session(Arc::new(AbsentSelector));
    let token = c.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let response = c.parse(&low_doc("first candidate text"), Some(200), "acme", None).await;
    assert_eq!(response.display_text, "second candidate text, a bit longer");
    assert!(!response.correction_available);
    assert!(!c.has_correctable_result());
    assert!(store.list("acme").unwrap().is_empty());
}

#[tokio::test]
async fn test_store_outage_does_not_block_parsing() {
    let store = Arc::new(FormatHintStore::new(Arc::new(DownBackend)));
    let selector = ScriptedSelector::new(&[Answer::Pick(0, true)]);
    let mut c = Coordinator::new(store, selector);

    let known = c.parse(OPENAI, Some(200), "acme", None).await;
    assert_eq!(known.display_text, "hi");

    let chosen = c.parse(&low_doc("first candidate text"), Some(200), "acme", None).await;
    assert_eq!(chosen.display_text, "second candidate text, a bit longer");
    assert!(!chosen.is_error);

    c.parse(&medium_doc(), Some(200), "acme", None).await;
    assert!(!c.confirm_correction());
    assert!(c.has_correctable_result());
}

#[tokio::test]
async fn test_hint_miss_records_failure_and_falls_through() {
    let selector = ScriptedSelector::new(&[]);
    let (mut c, store) = session(selector);
    store.save(&FormatHint::new("acme", None, path("data.reply"))).unwrap();

    let response = c.parse(OPENAI, Some(200), "acme", Some("m1")).await;
    assert_eq!(response.parse_strategy(), ParseStrategy::KnownSchema);
    assert_eq!(store.get("acme", None).unwrap().unwrap().failure_count, 1);
}

#[tokio::test]
async fn test_errors_skip_hints_and_context() {
    let selector = ScriptedSelector::new(&[]);
    let (mut c, store) = session(selector.clone());
    store.save(&FormatHint::new("acme", None, path("error.message"))).unwrap();

    let response = c
        .parse(r#"{"error":{"message":"Rate limit exceeded, please retry"}}"#, Some(429), "acme", None)
        .await;
    assert_eq!(response.error_kind, Some(ErrorKind::RateLimited));
    assert!(!c.has_correctable_result());
    assert_eq!(store.get("acme", None).unwrap().unwrap().success_count, 0);

    let empty = c.parse("{}", Some(500), "acme", None).await;
    assert_eq!(empty.error_kind, Some(ErrorKind::ServerError));
    assert!(empty.candidates().is_empty());

    let network = c.parse("", None, "acme", None).await;
    assert_eq!(network.error_kind, Some(ErrorKind::NetworkError));

    let nothing = c.parse(r#"{"n": 1}"#, Some(200), "acme", None).await;
    assert_eq!(nothing.error_kind, Some(ErrorKind::ParseError));
    assert!(!nothing.correction_available);
    assert!(selector.requests().is_empty());
}
