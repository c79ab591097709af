//! Heuristic candidate ranker for unrecognised envelopes.
//!
//! Walks the whole document, scores every string leaf and returns the best
//! few. The walk uses an explicit stack and stops at
//! [`RankerConfig::max_depth`] and [`RankerConfig::max_nodes`], so latency is
//! bounded even for pathological documents.

use serde_json::Value;

use crate::{
    candidate::TextCandidate,
    config::RankerConfig,
    path::JsonPath,
    scoring::{rank_candidates, score_leaf},
};

/// Ranks every plausible string in `value`.
///
/// An empty result is a valid outcome meaning no string passed the filters.
///
/// # Examples
///
/// ```
/// use replyparse::{config::RankerConfig, ranker::rank};
/// use serde_json::json;
///
/// let doc = json!({"id": "42", "data": {"answer": "Paris is the capital of France."}});
/// let ranked = rank(&doc, &RankerConfig::default());
/// assert_eq!(ranked.len(), 1);
/// assert_eq!(ranked[0].path_string(), "data.answer");
/// ```
pub fn rank(value: &Value, config: &RankerConfig) -> Vec<TextCandidate> {
    let mut candidates = Vec::new();
    let mut stack: Vec<(&Value, JsonPath)> = vec![(value, JsonPath::root())];
    let mut visited = 0usize;

    while let Some((node, path)) = stack.pop() {
        visited += 1;
        if visited > config.max_nodes {
            break;
        }

        match node {
            Value::String(text) => {
                if let Some(score) = score_leaf(&path, text, config) {
                    candidates.push(TextCandidate::new(
                        path,
                        text.as_str(),
                        score,
                        config.preview_chars,
                    ));
                }
            }
            Value::Object(map) if path.depth() < config.max_depth => {
                for (key, child) in map.iter().rev() {
                    stack.push((child, path.key(key.as_str())));
                }
            }
            Value::Array(items) if path.depth() < config.max_depth => {
                for (index, child) in items.iter().enumerate().rev() {
                    stack.push((child, path.index(index)));
                }
            }
            _ => {}
        }
    }

    let mut ranked = rank_candidates(candidates);
    ranked.truncate(config.max_candidates);
    ranked
}

/// Parses `raw` and ranks it; unparseable input yields no candidates.
pub fn rank_raw(raw: &str, config: &RankerConfig) -> Vec<TextCandidate> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => rank(&value, config),
        Err(_) => Vec::new(),
    }
}
