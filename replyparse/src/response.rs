//! Terminal pipeline output.

use serde::{Deserialize, Serialize};

use crate::{
    candidate::TextCandidate,
    classify::{ClassifiedError, ErrorKind},
    confidence::{Confidence, ParseStrategy},
    path::JsonPath,
    schema::{DetectionResult, DetectionSchema, TokenUsage},
};

/// How a [`ParsedResponse`] was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Route that produced the text.
    pub parse_strategy: ParseStrategy,
    /// How sure the pipeline is.
    pub confidence: Confidence,
    /// Ranked candidates; empty unless the heuristic ranker ran.
    pub candidates: Vec<TextCandidate>,
    /// Token accounting, when the envelope reported it.
    pub token_usage: Option<TokenUsage>,
    /// Detected envelope.
    pub schema: DetectionSchema,
    /// Provider request/response id.
    pub request_id: Option<String>,
    /// Why generation stopped.
    pub finish_reason: Option<String>,
    /// Path the displayed text was read from.
    pub content_path: Option<JsonPath>,
}

impl ResponseMetadata {
    fn from_detection(strategy: ParseStrategy, confidence: Confidence, detection: &DetectionResult) -> Self {
        Self {
            parse_strategy: strategy,
            confidence,
            candidates: Vec::new(),
            token_usage: detection.token_usage,
            schema: detection.schema,
            request_id: detection.request_id.clone(),
            finish_reason: detection.finish_reason.clone(),
            content_path: None,
        }
    }
}

/// What the orchestration layer shows for one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Text to display: the answer, or a fixed message for failures.
    pub display_text: String,
    /// True for provider, network and extraction failures.
    pub is_error: bool,
    /// Provider's message (or the fixed text) for failures.
    pub error_message: Option<String>,
    /// Failure bucket.
    pub error_kind: Option<ErrorKind>,
    /// True when `confirm`/`correct` can act on this exchange.
    pub correction_available: bool,
    /// Provenance.
    pub metadata: ResponseMetadata,
}

impl ParsedResponse {
    /// A successfully extracted answer.
    pub(crate) fn success(
        text: String,
        strategy: ParseStrategy,
        confidence: Confidence,
        detection: &DetectionResult,
        content_path: Option<JsonPath>,
    ) -> Self {
        let mut metadata = ResponseMetadata::from_detection(strategy, confidence, detection);
        metadata.content_path = content_path;
        Self {
            display_text: text,
            is_error: false,
            error_message: None,
            error_kind: None,
            correction_available: false,
            metadata,
        }
    }

    /// A heuristic answer picked from `candidates`.
    pub(crate) fn heuristic(
        chosen: &TextCandidate,
        confidence: Confidence,
        candidates: Vec<TextCandidate>,
        detection: &DetectionResult,
        correction_available: bool,
    ) -> Self {
        let mut response = Self::success(
            chosen.full_text.clone(),
            ParseStrategy::Heuristic,
            confidence,
            detection,
            Some(chosen.path.clone()),
        );
        response.metadata.candidates = candidates;
        response.correction_available = correction_available;
        response
    }

    /// A classified failure.
    pub(crate) fn failure(error: ClassifiedError, detection: &DetectionResult) -> Self {
        Self {
            display_text: error.kind.user_message().to_string(),
            is_error: true,
            error_message: Some(error.message),
            error_kind: Some(error.kind),
            correction_available: false,
            metadata: ResponseMetadata::from_detection(ParseStrategy::Failed, Confidence::None, detection),
        }
    }

    /// A failure with only its kind known.
    pub(crate) fn failure_of(kind: ErrorKind, detection: &DetectionResult) -> Self {
        Self::failure(
            ClassifiedError {
                kind,
                message: kind.user_message().to_string(),
            },
            detection,
        )
    }

    /// Strategy shortcut.
    #[inline]
    pub fn parse_strategy(&self) -> ParseStrategy {
        self.metadata.parse_strategy
    }

    /// Confidence shortcut.
    #[inline]
    pub fn confidence(&self) -> Confidence {
        self.metadata.confidence
    }

    /// Candidates shortcut.
    #[inline]
    pub fn candidates(&self) -> &[TextCandidate] {
        &self.metadata.candidates
    }
}
