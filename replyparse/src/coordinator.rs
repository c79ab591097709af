//! Per-session correction flow.
//!
//! The [`Coordinator`] runs the pipeline for each exchange and decides which
//! of three outcomes applies:
//!
//! 1. A learned hint or a recognised envelope yields the text directly.
//! 2. The ranker's top candidate is a confident guess: show it and keep a
//!    [`CorrectionContext`] so the user can confirm or correct it.
//! 3. The ranker is unsure: ask the [`CandidateSelector`] first, falling back
//!    to the top candidate if the user cancels.
//!
//! Every method takes `&mut self`, so a session's transitions are serialized
//! by the borrow checker. Share the [`FormatHintStore`] between sessions, not
//! the coordinator.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    candidate::TextCandidate,
    classify::{classify, classify_raw, ErrorKind},
    config::PipelineConfig,
    confidence::{Confidence, ParseStrategy},
    extractor::{extract, extract_at},
    hints::FormatHintStore,
    path::JsonPath,
    ranker::rank,
    response::ParsedResponse,
    schema::{detect_value, DetectionResult, DetectionSchema},
    scoring::ranked_confidence,
    selection::{CandidateSelector, Selection, SelectionRequest},
};

/// State kept for the latest correctable exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionContext {
    /// Monotonic id of the exchange within the session.
    pub exchange_id: u64,
    /// Provider that produced the response.
    pub provider_id: String,
    /// Model that produced the response.
    pub model_id: Option<String>,
    /// The untouched response body.
    pub raw_json: String,
    /// Ranked candidates offered for correction.
    pub candidates: Vec<TextCandidate>,
    /// Path of the text currently displayed.
    pub selected_path: JsonPath,
    /// Detection outcome, reused for the metadata of a corrected response.
    pub detection: DetectionResult,
    /// True once `selected_path` has been stored as a hint for this exchange.
    pub hint_saved: bool,
}

/// Result of [`Coordinator::request_correction`].
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionOutcome {
    /// The user picked a candidate; its path was learned if they asked.
    Corrected(ParsedResponse),
    /// The user dismissed the selector.
    Cancelled,
    /// There is no correctable exchange.
    Unavailable,
}

/// One chat session's view of the interpretation pipeline.
pub struct Coordinator {
    store: Arc<FormatHintStore>,
    selector: Arc<dyn CandidateSelector>,
    config: PipelineConfig,
    context: Option<CorrectionContext>,
    next_exchange: u64,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("next_exchange", &self.next_exchange)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates a coordinator with the default configuration.
    pub fn new(store: Arc<FormatHintStore>, selector: Arc<dyn CandidateSelector>) -> Self {
        Self {
            store,
            selector,
            config: PipelineConfig::default(),
            context: None,
            next_exchange: 1,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the pipeline configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Ties the session to an externally owned token, e.g. a child of the
    /// application's shutdown token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that ends the session. Cancelling it aborts a pending selection.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The shared hint store.
    pub fn store(&self) -> &Arc<FormatHintStore> {
        &self.store
    }

    /// Interprets one exchange.
    ///
    /// Never fails: every problem is reported through the returned
    /// [`ParsedResponse`]. The previous exchange's context is dropped first.
    pub async fn parse(
        &mut self,
        raw: &str,
        http_status: Option<u16>,
        provider_id: &str,
        model_id: Option<&str>,
    ) -> ParsedResponse {
        self.context = None;
        let exchange_id = self.next_exchange;
        self.next_exchange += 1;

        let (value, detection) = match open_envelope(raw, http_status) {
            Envelope::Answer(value, detection) => (value, detection),
            Envelope::Failed(response) => {
                debug!(provider = provider_id, kind = ?response.error_kind, "exchange failed");
                return response;
            }
        };

        if let Some(response) = self.try_hint(&value, &detection, provider_id, model_id) {
            return response;
        }

        if detection.is_trusted() {
            if let Some(text) = extract(&value, &detection) {
                return ParsedResponse::success(
                    text,
                    ParseStrategy::KnownSchema,
                    Confidence::High,
                    &detection,
                    detection.content_path.clone(),
                );
            }
        }

        let candidates = rank(&value, &self.config.ranker);
        let confidence = ranked_confidence(&candidates, &self.config.thresholds);
        let Some(top) = candidates.first().cloned() else {
            debug!(provider = provider_id, "no usable candidates");
            return ParsedResponse::failure_of(ErrorKind::ParseError, &detection);
        };

        let mut context = CorrectionContext {
            exchange_id,
            provider_id: provider_id.to_string(),
            model_id: model_id.map(str::to_string),
            raw_json: raw.to_string(),
            candidates: candidates.clone(),
            selected_path: top.path.clone(),
            detection: detection.clone(),
            hint_saved: false,
        };

        if confidence == Confidence::Medium {
            debug!(provider = provider_id, path = %top.path, score = top.score, "showing tentative answer");
            self.context = Some(context);
            return ParsedResponse::heuristic(&top, confidence, candidates, &detection, true);
        }

        let request = SelectionRequest {
            candidates: candidates.clone(),
            raw_json: raw.to_string(),
            provider_id: provider_id.to_string(),
            model_id: model_id.map(str::to_string),
            is_recorrection: false,
        };
        match self.await_selection(request).await {
            None => {
                warn!(provider = provider_id, "session cancelled during selection");
                ParsedResponse::heuristic(&top, confidence, candidates, &detection, false)
            }
            Some(Selection::Cancelled) => {
                debug!(provider = provider_id, path = %top.path, "selection cancelled, using top candidate");
                self.context = Some(context);
                ParsedResponse::heuristic(&top, confidence, candidates, &detection, true)
            }
            Some(Selection::Chosen { candidate, remember }) => {
                context.hint_saved = remember && self.learn(provider_id, model_id, &candidate.path);
                context.selected_path = candidate.path.clone();
                self.context = Some(context);
                ParsedResponse::heuristic(&candidate, Confidence::High, candidates, &detection, true)
            }
        }
    }

    /// Promotes the displayed candidate's path to a format hint and clears
    /// the context. Returns false when there is nothing to confirm or the
    /// store rejected the write, in which case the context is kept.
    ///
    /// A path already stored for this exchange is not counted again.
    pub fn confirm_correction(&mut self) -> bool {
        let Some(context) = self.context.as_ref() else {
            return false;
        };
        if context.hint_saved {
            debug!(provider = %context.provider_id, path = %context.selected_path, "hint already stored");
            self.context = None;
            return true;
        }
        match self.store.promote(
            &context.provider_id,
            context.model_id.as_deref(),
            &context.selected_path,
        ) {
            Ok(hint) => {
                debug!(
                    provider = %context.provider_id,
                    path = %hint.content_path,
                    successes = hint.success_count,
                    "confirmed correction"
                );
                self.context = None;
                true
            }
            Err(e) => {
                warn!(provider = %context.provider_id, error = %e, "failed to store confirmed hint");
                false
            }
        }
    }

    /// Re-opens the selector for the latest correctable exchange.
    ///
    /// A selection ends the exchange; its path becomes a hint only when the
    /// user asked to remember it. A cancelled
    /// selection keeps the context, so the user may try again; a cancelled
    /// session drops it.
    pub async fn request_correction(&mut self) -> CorrectionOutcome {
        let Some(context) = self.context.as_ref() else {
            return CorrectionOutcome::Unavailable;
        };
        let request = SelectionRequest {
            candidates: context.candidates.clone(),
            raw_json: context.raw_json.clone(),
            provider_id: context.provider_id.clone(),
            model_id: context.model_id.clone(),
            is_recorrection: true,
        };

        match self.await_selection(request).await {
            None => {
                warn!("session cancelled during correction");
                self.context = None;
                CorrectionOutcome::Cancelled
            }
            Some(Selection::Cancelled) => {
                debug!("correction cancelled, keeping context");
                CorrectionOutcome::Cancelled
            }
            Some(Selection::Chosen { candidate, remember }) => {
                let Some(context) = self.context.take() else {
                    return CorrectionOutcome::Unavailable;
                };
                if remember {
                    self.learn(&context.provider_id, context.model_id.as_deref(), &candidate.path);
                }
                CorrectionOutcome::Corrected(ParsedResponse::heuristic(
                    &candidate,
                    Confidence::High,
                    context.candidates,
                    &context.detection,
                    false,
                ))
            }
        }
    }

    /// The raw body of the latest correctable exchange.
    pub fn show_raw(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.raw_json.as_str())
    }

    /// Returns true while confirm/correct can act.
    pub fn has_correctable_result(&self) -> bool {
        self.context.is_some()
    }

    /// The latest correctable exchange, if any.
    pub fn context(&self) -> Option<&CorrectionContext> {
        self.context.as_ref()
    }

    /// Forgets the latest exchange.
    pub fn clear_context(&mut self) {
        self.context = None;
    }

    /// Waits for the selector unless the session is cancelled first.
    async fn await_selection(&self, request: SelectionRequest) -> Option<Selection> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            selection = self.selector.select(request) => Some(selection),
        }
    }

    fn try_hint(
        &self,
        value: &Value,
        detection: &DetectionResult,
        provider_id: &str,
        model_id: Option<&str>,
    ) -> Option<ParsedResponse> {
        let hint = match self.store.find(provider_id, model_id) {
            Ok(hint) => hint?,
            Err(e) => {
                warn!(provider = provider_id, model = model_id, error = %e, "hint lookup failed");
                return None;
            }
        };

        match extract_at(value, &hint.content_path) {
            Some(text) => {
                if let Err(e) = self.store.record_success(&hint) {
                    warn!(provider = provider_id, error = %e, "failed to record hint success");
                }
                debug!(provider = provider_id, path = %hint.content_path, "resolved via learned hint");
                Some(ParsedResponse::success(
                    text,
                    ParseStrategy::LearnedHint,
                    Confidence::High,
                    detection,
                    Some(hint.content_path),
                ))
            }
            None => {
                if let Err(e) = self.store.record_failure(&hint) {
                    warn!(provider = provider_id, error = %e, "failed to record hint failure");
                }
                debug!(provider = provider_id, path = %hint.content_path, "learned hint missed");
                None
            }
        }
    }

    /// Promotes `path`; returns whether the store accepted it.
    fn learn(&self, provider_id: &str, model_id: Option<&str>, path: &JsonPath) -> bool {
        match self.store.promote(provider_id, model_id, path) {
            Ok(hint) => {
                debug!(provider = provider_id, path = %hint.content_path, "learned format hint");
                true
            }
            Err(e) => {
                warn!(provider = provider_id, error = %e, "failed to store format hint");
                false
            }
        }
    }
}

/// A response body after the failure checks.
pub(crate) enum Envelope {
    /// A JSON document that is not an error.
    Answer(Value, DetectionResult),
    /// A classified failure, ready to return.
    Failed(ParsedResponse),
}

/// Parses and detects `raw`, turning transport and provider failures into
/// responses. Shared by the coordinator and the stateless entry points.
pub(crate) fn open_envelope(raw: &str, http_status: Option<u16>) -> Envelope {
    let failed_status = http_status.filter(|s| *s >= 400);
    let body = raw.trim();
    if body.is_empty() {
        let unknown = DetectionResult::unknown();
        return Envelope::Failed(match http_status {
            Some(status) if status < 400 => ParsedResponse::failure_of(ErrorKind::ParseError, &unknown),
            _ => ParsedResponse::failure(classify(None, http_status), &unknown),
        });
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "response body is not JSON");
            let unknown = DetectionResult::unknown();
            return Envelope::Failed(match failed_status {
                Some(_) => ParsedResponse::failure(classify_raw(Some(body), http_status), &unknown),
                None => ParsedResponse::failure_of(ErrorKind::ParseError, &unknown),
            });
        }
    };

    let detection = detect_value(&value);
    debug!(schema = %detection.schema, confidence = %detection.confidence, "detected envelope");

    if failed_status.is_some() || detection.schema == DetectionSchema::ErrorEnvelope {
        return Envelope::Failed(ParsedResponse::failure(classify(Some(&value), http_status), &detection));
    }
    Envelope::Answer(value, detection)
}
