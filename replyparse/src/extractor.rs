//! Schema-aware content extraction.
//!
//! Every function here returns `None` on a structural mismatch; that is the
//! only failure signal and tells the caller to fall back to the ranker.
//! Blank results count as mismatches.

use serde_json::Value;

use crate::{
    path::JsonPath,
    schema::{DetectionResult, DetectionSchema},
};

/// Extracts the answer text (or, for error envelopes, the error message)
/// from a response whose schema has already been detected.
///
/// # Examples
///
/// ```
/// use replyparse::{extractor::extract, schema::detect_value};
/// use serde_json::json;
///
/// let doc = json!({"candidates": [{"content": {"parts": [{"text": "Hel"}, {"text": "lo"}]}}]});
/// let detection = detect_value(&doc);
/// assert_eq!(extract(&doc, &detection).as_deref(), Some("Hello"));
/// ```
pub fn extract(value: &Value, detection: &DetectionResult) -> Option<String> {
    match detection.schema {
        DetectionSchema::OpenAiLike => extract_at(value, detection.content_path.as_ref()?),
        DetectionSchema::GeminiLike => {
            join_gemini_parts(detection.content_path.as_ref()?.resolve(value)?)
        }
        DetectionSchema::AnthropicLike => {
            join_text_blocks(detection.content_path.as_ref()?.resolve(value)?.as_array()?)
        }
        DetectionSchema::ErrorEnvelope => extract_error_message(value),
        DetectionSchema::Unknown => None,
    }
}

/// Extracts the string at `path`, used for learned hints and chosen candidates.
pub fn extract_at(value: &Value, path: &JsonPath) -> Option<String> {
    path.resolve(value)?.as_str().and_then(non_blank)
}

/// Parses `raw` and extracts the string at `path`.
pub fn extract_raw_at(raw: &str, path: &JsonPath) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    extract_at(&value, path)
}

/// Concatenates the `text` of every part, with no separator.
pub fn join_gemini_parts(parts: &Value) -> Option<String> {
    let text: String = parts
        .as_array()?
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    non_blank(&text)
}

/// Concatenates blocks whose `type` is `"text"`; tool calls and other
/// block kinds are skipped.
pub fn join_text_blocks(blocks: &[Value]) -> Option<String> {
    let text: String = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    non_blank(&text)
}

/// Returns `error.message`, or `error` itself when it is a plain string.
pub fn extract_error_message(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::String(s) => non_blank(s),
        Value::Object(obj) => obj.get("message")?.as_str().and_then(non_blank),
        _ => None,
    }
}

#[inline]
fn non_blank(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
