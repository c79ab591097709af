//! Shared vocabulary for certainty and provenance of an extraction.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Qualitative certainty that an extraction is correct.
///
/// Variants are declared in ascending order so the derived `Ord` can be used
/// directly for thresholding (`confidence >= Confidence::Medium`).
///
/// # Examples
///
/// ```
/// use replyparse::confidence::Confidence;
///
/// assert!(Confidence::High > Confidence::Medium);
/// assert!(Confidence::Low > Confidence::None);
/// assert_eq!(Confidence::Medium.max(Confidence::Low), Confidence::Medium);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    /// Nothing usable was found.
    #[default]
    None,
    /// A guess that must be confirmed by a human before display.
    Low,
    /// A plausible guess that may be shown with an offer to correct.
    Medium,
    /// Trusted; shown as-is.
    High,
}

impl Confidence {
    /// Returns true when the extraction may be displayed without asking first.
    #[inline]
    pub const fn is_displayable(self) -> bool {
        matches!(self, Confidence::Medium | Confidence::High)
    }

    /// Stable lowercase name used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Confidence::None => "none",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the displayed content was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseStrategy {
    /// A recognised vendor envelope.
    KnownSchema,
    /// A path previously taught by a human.
    LearnedHint,
    /// The heuristic candidate ranker.
    Heuristic,
    /// No content could be located.
    Failed,
}

impl ParseStrategy {
    /// Stable lowercase name used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            ParseStrategy::KnownSchema => "known_schema",
            ParseStrategy::LearnedHint => "learned_hint",
            ParseStrategy::Heuristic => "heuristic",
            ParseStrategy::Failed => "failed",
        }
    }
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
