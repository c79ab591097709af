//! Candidate text extractions produced by the heuristic ranker.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::path::JsonPath;

/// Marker appended to truncated previews.
const ELLIPSIS: char = '…';

/// One plausible location of the answer text.
///
/// Ranked lists are ordered by [`TextCandidate::ranking_order`]: score
/// descending, then rendered path ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCandidate {
    /// Where in the document the text was found.
    pub path: JsonPath,
    /// Short single-line excerpt for display.
    pub preview: String,
    /// Plausibility score; higher is better.
    pub score: i64,
    /// The complete string.
    pub full_text: String,
}

impl TextCandidate {
    /// Creates a candidate, deriving the preview from `full_text`.
    ///
    /// # Examples
    ///
    /// ```
    /// use replyparse::{candidate::TextCandidate, path::JsonPath};
    ///
    /// let c = TextCandidate::new(JsonPath::root().key("answer"), "a\nlong   text", 40, 7);
    /// assert_eq!(c.preview, "a long…");
    /// ```
    pub fn new(path: JsonPath, full_text: impl Into<String>, score: i64, preview_chars: usize) -> Self {
        let full_text = full_text.into();
        Self {
            preview: make_preview(&full_text, preview_chars),
            path,
            score,
            full_text,
        }
    }

    /// The rendered pointer string.
    #[inline]
    pub fn path_string(&self) -> String {
        self.path.to_string()
    }

    /// Total order used for ranked lists.
    pub fn ranking_order(a: &Self, b: &Self) -> Ordering {
        b.score
            .cmp(&a.score)
            .then_with(|| a.path.to_string().cmp(&b.path.to_string()))
    }
}

/// Collapses whitespace and truncates to `max_chars`, marking truncation.
fn make_preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut preview: String = collapsed
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect();
    let trimmed_len = preview.trim_end().len();
    preview.truncate(trimmed_len);
    preview.push(ELLIPSIS);
    preview
}

/// Returns true when `candidates` already satisfy the ranking order.
pub fn is_ranked(candidates: &[TextCandidate]) -> bool {
    candidates
        .windows(2)
        .all(|w| TextCandidate::ranking_order(&w[0], &w[1]) != Ordering::Greater)
}
