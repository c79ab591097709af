//! # replyparse
//!
//! Turns raw LLM provider responses into displayable text, even when the
//! envelope is one the library has never seen.
//!
//! The pipeline handles:
//! - OpenAI-, Gemini- and Anthropic-shaped envelopes
//! - Provider error envelopes, classified into a fixed set of [`ErrorKind`]s
//! - Unknown shapes, via a bounded heuristic ranking of every string leaf
//! - Learned format hints that remember where the answer lives per provider
//!
//! ## Quick Start
//!
//! ```rust
//! use replyparse::interpret;
//!
//! let raw = r#"{"choices": [{"message": {"content": "Hello!"}}]}"#;
//! let response = interpret(raw, Some(200));
//! assert_eq!(response.display_text, "Hello!");
//! assert!(!response.is_error);
//! ```
//!
//! ## Sessions
//!
//! For the full correction flow (asking a human when unsure, learning the
//! answer path, confirming or correcting a guess) use a [`Coordinator`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use replyparse::{Coordinator, FormatHintStore, HeadlessSelector};
//!
//! # tokio_test_block(async {
//! let store = Arc::new(FormatHintStore::in_memory());
//! let mut session = Coordinator::new(store, Arc::new(HeadlessSelector));
//!
//! let raw = r#"{"result": {"reply": "The answer is forty-two, as computed."}}"#;
//! let response = session.parse(raw, Some(200), "acme", Some("acme-large")).await;
//! assert_eq!(response.display_text, "The answer is forty-two, as computed.");
//! assert!(session.has_correctable_result());
//! assert!(session.confirm_correction());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod candidate;
pub mod classify;
pub mod confidence;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod hints;
pub mod path;
pub mod ranker;
pub mod response;
pub mod schema;
pub mod scoring;
pub mod selection;

pub use candidate::TextCandidate;
pub use classify::{ClassifiedError, ErrorKind};
pub use confidence::{Confidence, ParseStrategy};
pub use config::{ConfidenceThresholds, PipelineConfig, RankerConfig};
pub use coordinator::{CorrectionContext, CorrectionOutcome, Coordinator};
pub use error::{ConfigError, HintStoreError};
pub use hints::{FormatHint, FormatHintStore, HintBackend, JsonFileBackend, MemoryBackend};
pub use path::JsonPath;
pub use response::{ParsedResponse, ResponseMetadata};
pub use schema::{DetectionResult, DetectionSchema, TokenUsage};
pub use selection::{CandidateSelector, HeadlessSelector, Selection, SelectionRequest};

use coordinator::{open_envelope, Envelope};

/// Interprets one response without hints or human selection.
///
/// Recognised envelopes yield their text; anything else falls back to the
/// ranker's top candidate. Never fails.
///
/// # Examples
///
/// ```
/// use replyparse::{interpret, ErrorKind, ParseStrategy};
///
/// let ok = interpret(r#"{"foo": {"bar": "this could be the answer, it's long enough to look real"}}"#, Some(200));
/// assert_eq!(ok.parse_strategy(), ParseStrategy::Heuristic);
/// assert_eq!(ok.candidates()[0].path_string(), "foo.bar");
///
/// let err = interpret("", None);
/// assert_eq!(err.error_kind, Some(ErrorKind::NetworkError));
/// ```
pub fn interpret(raw: &str, http_status: Option<u16>) -> ParsedResponse {
    interpret_with_config(raw, http_status, &PipelineConfig::default())
}

/// Like [`interpret`], with explicit limits and thresholds.
pub fn interpret_with_config(raw: &str, http_status: Option<u16>, config: &PipelineConfig) -> ParsedResponse {
    let (value, detection) = match open_envelope(raw, http_status) {
        Envelope::Answer(value, detection) => (value, detection),
        Envelope::Failed(response) => return response,
    };

    if detection.is_trusted() {
        if let Some(text) = extractor::extract(&value, &detection) {
            return ParsedResponse::success(
                text,
                ParseStrategy::KnownSchema,
                Confidence::High,
                &detection,
                detection.content_path.clone(),
            );
        }
    }

    let candidates = ranker::rank(&value, &config.ranker);
    let confidence = scoring::ranked_confidence(&candidates, &config.thresholds);
    match candidates.first().cloned() {
        Some(top) => ParsedResponse::heuristic(&top, confidence, candidates, &detection, false),
        None => ParsedResponse::failure_of(ErrorKind::ParseError, &detection),
    }
}
