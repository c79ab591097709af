//! The human-in-the-loop seam.
//!
//! When the pipeline cannot tell which string is the answer it asks a
//! [`CandidateSelector`]. The selector only answers the question; persisting
//! a hint from the answer is the coordinator's job.

use async_trait::async_trait;

use crate::candidate::TextCandidate;

/// Everything a selector needs to present the choice.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    /// Ranked candidates, best first.
    pub candidates: Vec<TextCandidate>,
    /// The untouched response body, for a "show raw" view.
    pub raw_json: String,
    /// Provider that produced the response.
    pub provider_id: String,
    /// Model that produced the response, if known.
    pub model_id: Option<String>,
    /// True when the user asked to correct an answer already shown.
    pub is_recorrection: bool,
}

/// A selector's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The user picked a candidate.
    Chosen {
        /// The picked candidate.
        candidate: TextCandidate,
        /// Whether the user wants this path remembered for the provider/model.
        remember: bool,
    },
    /// The user dismissed the prompt.
    Cancelled,
}

impl Selection {
    /// Convenience constructor for a chosen candidate.
    pub fn chosen(candidate: TextCandidate, remember: bool) -> Self {
        Self::Chosen { candidate, remember }
    }
}

/// Presents candidates to a human and waits for a pick.
///
/// May take arbitrarily long. The coordinator races it against session
/// cancellation, so implementations need not watch for that themselves.
#[async_trait]
pub trait CandidateSelector: Send + Sync {
    /// Asks for a choice among `request.candidates`.
    async fn select(&self, request: SelectionRequest) -> Selection;
}

/// Selector for non-interactive contexts: always cancels, so the pipeline
/// falls back to its best guess.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessSelector;

#[async_trait]
impl CandidateSelector for HeadlessSelector {
    async fn select(&self, _request: SelectionRequest) -> Selection {
        Selection::Cancelled
    }
}
