//! Scoring system for ranking text candidates.
//!
//! Higher scores are better. A leaf string's score is built from:
//! - Length, saturating at [`RankerConfig::length_cap`]
//! - A bonus when its nearest key looks like a content field
//! - A penalty when its nearest key is envelope metadata
//! - A penalty per nesting level past [`RankerConfig::depth_penalty_start`]
//!
//! The weights are tuning choices. What callers may rely on is that scoring
//! is a pure function of (path, text, config) and that ranked lists follow
//! [`TextCandidate::ranking_order`].

use std::cmp::Reverse;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    candidate::TextCandidate,
    config::{ConfidenceThresholds, RankerConfig},
    confidence::Confidence,
    path::JsonPath,
};

/// Maximum score contributed by length alone.
pub const LENGTH_WEIGHT: i64 = 60;

/// Bonus when the key is exactly a content-ish name.
pub const EXACT_KEY_BONUS: i64 = 40;

/// Bonus when the key contains a content-ish name.
pub const PARTIAL_KEY_BONUS: i64 = 20;

/// Penalty when the key is known envelope metadata.
pub const METADATA_KEY_PENALTY: i64 = 30;

/// Key names (normalized) that usually hold the answer.
const CONTENT_KEYS: &[&str] = &[
    "text",
    "content",
    "message",
    "answer",
    "output",
    "result",
    "response",
    "reply",
    "completion",
];

/// Key names (normalized) that describe the envelope rather than the answer.
const METADATA_KEYS: &[&str] = &[
    "id",
    "model",
    "object",
    "role",
    "type",
    "status",
    "created",
    "name",
    "finishreason",
    "stopreason",
    "systemfingerprint",
    "requestid",
    "modelversion",
];

static NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(?:\d+(?:[.,]\d+)*|\.\d+)(?:[eE][-+]?\d+)?%?$")
        .expect("Invalid number regex pattern")
});

static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)\{?[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\}?$")
        .expect("Invalid UUID regex pattern")
});

/// Lowercases and drops `_`/`-` so `finish_reason` and `finishReason` agree.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Returns true for strings that can never be the answer.
///
/// # Examples
///
/// ```
/// use replyparse::{config::RankerConfig, scoring::is_excluded};
///
/// let config = RankerConfig::default();
/// assert!(is_excluded("42", &config));
/// assert!(is_excluded("550e8400-e29b-41d4-a716-446655440000", &config));
/// assert!(is_excluded("ok", &config));
/// assert!(!is_excluded("The answer is 42.", &config));
/// ```
pub fn is_excluded(text: &str, config: &RankerConfig) -> bool {
    let trimmed = text.trim();
    trimmed.chars().count() < config.min_length
        || NUMBER_REGEX.is_match(trimmed)
        || UUID_REGEX.is_match(trimmed)
}

/// Bonus or penalty from the nearest object key.
pub fn key_adjustment(key: Option<&str>) -> i64 {
    let Some(key) = key else {
        return 0;
    };
    let key = normalize_key(key);
    if CONTENT_KEYS.contains(&key.as_str()) {
        EXACT_KEY_BONUS
    } else if CONTENT_KEYS.iter().any(|k| key.contains(k)) {
        PARTIAL_KEY_BONUS
    } else if METADATA_KEYS.contains(&key.as_str()) {
        -METADATA_KEY_PENALTY
    } else {
        0
    }
}

/// Scores a string leaf, or returns `None` if it is excluded.
pub fn score_leaf(path: &JsonPath, text: &str, config: &RankerConfig) -> Option<i64> {
    if is_excluded(text, config) {
        return None;
    }

    let length = text.trim().chars().count().min(config.length_cap) as i64;
    let length_score = length * LENGTH_WEIGHT / config.length_cap.max(1) as i64;

    let excess_depth = path.depth().saturating_sub(config.depth_penalty_start) as i64;
    let depth_penalty = excess_depth * config.depth_penalty;

    Some(length_score + key_adjustment(path.parent_key()) - depth_penalty)
}

/// Sorts candidates into ranking order (best first).
///
/// # Examples
///
/// ```
/// use replyparse::{candidate::TextCandidate, scoring::rank_candidates};
///
/// let candidates = vec![
///     TextCandidate::new("b".parse().unwrap(), "x", 5, 80),
///     TextCandidate::new("a".parse().unwrap(), "y", 5, 80),
///     TextCandidate::new("c".parse().unwrap(), "z", 9, 80),
/// ];
/// let ranked = rank_candidates(candidates);
/// assert_eq!(ranked[0].path_string(), "c");
/// assert_eq!(ranked[1].path_string(), "a");
/// ```
pub fn rank_candidates(mut candidates: Vec<TextCandidate>) -> Vec<TextCandidate> {
    candidates.sort_by_cached_key(|c| (Reverse(c.score), c.path.to_string()));
    candidates
}

/// Returns the best candidate from a list.
pub fn best_candidate(candidates: Vec<TextCandidate>) -> Option<TextCandidate> {
    rank_candidates(candidates).into_iter().next()
}

/// Maps a ranked list to the confidence of its top entry.
///
/// MEDIUM needs both a high enough score and a clear lead over the
/// runner-up; any other non-empty list is LOW; an empty list is NONE.
pub fn ranked_confidence(ranked: &[TextCandidate], thresholds: &ConfidenceThresholds) -> Confidence {
    let Some(top) = ranked.first() else {
        return Confidence::None;
    };
    let clear_lead = ranked
        .get(1)
        .map_or(true, |runner_up| top.score - runner_up.score >= thresholds.min_margin);

    if top.score >= thresholds.medium_score && clear_lead {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> JsonPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_excluded_strings() {
        let config = RankerConfig::default();
        assert!(is_excluded("  ", &config));
        assert!(is_excluded("3.14", &config));
        assert!(is_excluded("-12,000.5", &config));
        assert!(is_excluded("1e10", &config));
        assert!(is_excluded("{550E8400-E29B-41D4-A716-446655440000}", &config));
        assert!(!is_excluded("abc", &config));
        assert!(!is_excluded("v1.2.3-beta", &config));
    }

    #[test]
    fn test_length_saturates() {
        let config = RankerConfig::default();
        let long = "a".repeat(config.length_cap);
        let huge = "a".repeat(config.length_cap * 50);
        assert_eq!(
            score_leaf(&path("x"), &long, &config),
            score_leaf(&path("x"), &huge, &config)
        );
        assert_eq!(score_leaf(&path("x"), &long, &config), Some(LENGTH_WEIGHT));
    }

    #[test]
    fn test_key_adjustments() {
        assert_eq!(key_adjustment(Some("content")), EXACT_KEY_BONUS);
        assert_eq!(key_adjustment(Some("Answer")), EXACT_KEY_BONUS);
        assert_eq!(key_adjustment(Some("generated_text")), PARTIAL_KEY_BONUS);
        assert_eq!(key_adjustment(Some("outputText")), PARTIAL_KEY_BONUS);
        assert_eq!(key_adjustment(Some("finish_reason")), -METADATA_KEY_PENALTY);
        assert_eq!(key_adjustment(Some("finishReason")), -METADATA_KEY_PENALTY);
        assert_eq!(key_adjustment(Some("bar")), 0);
        assert_eq!(key_adjustment(None), 0);
    }

    #[test]
    fn test_depth_penalty_prefers_shallow() {
        let config = RankerConfig::default();
        let text = "the same reasonably long sentence";
        let shallow = score_leaf(&path("a.b"), text, &config).unwrap();
        let deep = score_leaf(&path("a.b.c.d.e.f"), text, &config).unwrap();
        assert_eq!(shallow - deep, 3 * config.depth_penalty);
    }

    #[test]
    fn test_ranked_confidence() {
        let thresholds = ConfidenceThresholds::new(50, 10);
        let c = |p: &str, s: i64| TextCandidate::new(path(p), "t", s, 80);

        assert_eq!(ranked_confidence(&[], &thresholds), Confidence::None);
        assert_eq!(ranked_confidence(&[c("a", 70)], &thresholds), Confidence::Medium);
        assert_eq!(ranked_confidence(&[c("a", 40)], &thresholds), Confidence::Low);
        assert_eq!(
            ranked_confidence(&[c("a", 70), c("b", 65)], &thresholds),
            Confidence::Low
        );
        assert_eq!(
            ranked_confidence(&[c("a", 70), c("b", 60)], &thresholds),
            Confidence::Medium
        );
    }

    #[test]
    fn test_best_candidate_empty() {
        assert!(best_candidate(Vec::new()).is_none());
    }
}
