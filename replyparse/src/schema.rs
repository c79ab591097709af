//! Recognition of vendor response envelopes.
//!
//! The detector looks for structural signatures only; it never inspects the
//! meaning of the text. Signatures are tried in a fixed order and the first
//! match wins:
//!
//! 1. OpenAI-like: `choices[0]` holding a `message`, `delta` or `text` member
//! 2. Gemini-like: `candidates[0]` with a `content.parts` array
//! 3. Anthropic-like: a top-level `content` array of typed blocks
//! 4. Error envelope: a non-null top-level `error`, checked regardless of
//!    HTTP status because some providers embed errors in HTTP 200 bodies

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{confidence::Confidence, extractor, path::JsonPath};

/// The envelope shapes the detector recognises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionSchema {
    /// `choices[].message.content` style.
    OpenAiLike,
    /// `candidates[].content.parts[].text` style.
    GeminiLike,
    /// `content[]` typed-block style.
    AnthropicLike,
    /// `error` object or string.
    ErrorEnvelope,
    /// Nothing recognised.
    #[default]
    Unknown,
}

impl DetectionSchema {
    /// Stable lowercase name used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            DetectionSchema::OpenAiLike => "openai_like",
            DetectionSchema::GeminiLike => "gemini_like",
            DetectionSchema::AnthropicLike => "anthropic_like",
            DetectionSchema::ErrorEnvelope => "error_envelope",
            DetectionSchema::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DetectionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: Option<u64>,
    /// Tokens produced in the completion.
    pub completion_tokens: Option<u64>,
    /// Total tokens, as reported or summed.
    pub total_tokens: Option<u64>,
}

impl TokenUsage {
    fn from_fields(
        value: &Value,
        prompt: &str,
        completion: &str,
        total: Option<&str>,
    ) -> Option<Self> {
        let obj = value.as_object()?;
        let prompt_tokens = obj.get(prompt).and_then(Value::as_u64);
        let completion_tokens = obj.get(completion).and_then(Value::as_u64);
        let total_tokens = match total {
            Some(key) => obj.get(key).and_then(Value::as_u64),
            None => None,
        }
        .or_else(|| Some(prompt_tokens? + completion_tokens?));

        if prompt_tokens.is_none() && completion_tokens.is_none() && total_tokens.is_none() {
            return None;
        }
        Some(Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        })
    }
}

/// Outcome of schema detection for one response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// The recognised envelope.
    pub schema: DetectionSchema,
    /// Where the answer text lives.
    pub content_path: Option<JsonPath>,
    /// Where the provider's error message lives.
    pub error_path: Option<JsonPath>,
    /// How sure the detector is.
    pub confidence: Confidence,
    /// Token accounting, when reported.
    pub token_usage: Option<TokenUsage>,
    /// Provider request/response id.
    pub request_id: Option<String>,
    /// Why generation stopped.
    pub finish_reason: Option<String>,
}

impl DetectionResult {
    /// The result for unparseable or unrecognised input.
    #[inline]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Returns true when content may be extracted directly and shown.
    #[inline]
    pub fn is_trusted(&self) -> bool {
        self.confidence == Confidence::High && self.schema != DetectionSchema::ErrorEnvelope
    }
}

/// A structural match before confidence is assigned.
#[derive(Debug)]
struct Signature {
    schema: DetectionSchema,
    path: JsonPath,
    populated: bool,
}

/// Detects the envelope of a raw response body.
///
/// Never fails: malformed JSON yields [`DetectionResult::unknown`].
///
/// # Examples
///
/// ```
/// use replyparse::{confidence::Confidence, schema::{detect, DetectionSchema}};
///
/// let result = detect(r#"{"choices":[{"message":{"content":"hi"}}]}"#);
/// assert_eq!(result.schema, DetectionSchema::OpenAiLike);
/// assert_eq!(result.confidence, Confidence::High);
///
/// assert_eq!(detect("not json").schema, DetectionSchema::Unknown);
/// ```
pub fn detect(raw: &str) -> DetectionResult {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => detect_value(&value),
        Err(_) => DetectionResult::unknown(),
    }
}

/// Detects the envelope of an already-parsed response body.
pub fn detect_value(value: &Value) -> DetectionResult {
    if !value.is_object() {
        return DetectionResult::unknown();
    }

    let probes: [fn(&Value) -> Option<Signature>; 4] = [
        openai_signature,
        gemini_signature,
        anthropic_signature,
        error_signature,
    ];
    let matches: Vec<Signature> = probes.iter().filter_map(|probe| probe(value)).collect();

    let Some(winner) = matches.first() else {
        return DetectionResult::unknown();
    };

    let confidence = if matches.len() == 1 && winner.populated {
        Confidence::High
    } else {
        Confidence::Medium
    };

    let error_path = matches
        .iter()
        .find(|s| s.schema == DetectionSchema::ErrorEnvelope)
        .map(|s| s.path.clone());
    let content_path = match winner.schema {
        DetectionSchema::ErrorEnvelope | DetectionSchema::Unknown => None,
        _ => Some(winner.path.clone()),
    };

    let (token_usage, request_id, finish_reason) = metadata(winner.schema, value);

    DetectionResult {
        schema: winner.schema,
        content_path,
        error_path,
        confidence,
        token_usage,
        request_id,
        finish_reason,
    }
}

fn openai_signature(value: &Value) -> Option<Signature> {
    let first = value.get("choices")?.as_array()?.first()?.as_object()?;
    let choice = JsonPath::root().key("choices").index(0);

    let path = if first.get("message").is_some_and(Value::is_object) {
        choice.key("message").key("content")
    } else if first.get("delta").is_some_and(Value::is_object) {
        choice.key("delta").key("content")
    } else if first.contains_key("text") {
        choice.key("text")
    } else {
        return None;
    };

    Some(Signature {
        schema: DetectionSchema::OpenAiLike,
        populated: extractor::extract_at(value, &path).is_some(),
        path,
    })
}

fn gemini_signature(value: &Value) -> Option<Signature> {
    let first = value.get("candidates")?.as_array()?.first()?.as_object()?;
    let parts = first.get("content")?.get("parts")?;
    if !parts.is_array() {
        return None;
    }
    let path = JsonPath::root()
        .key("candidates")
        .index(0)
        .key("content")
        .key("parts");

    Some(Signature {
        schema: DetectionSchema::GeminiLike,
        populated: extractor::join_gemini_parts(parts).is_some(),
        path,
    })
}

fn anthropic_signature(value: &Value) -> Option<Signature> {
    let blocks = value.get("content")?.as_array()?;
    let typed = blocks
        .iter()
        .all(|b| b.get("type").is_some_and(Value::is_string));
    if !typed {
        return None;
    }
    // An empty array alone is too weak a signal.
    if blocks.is_empty() && value.get("role").is_none() && value.get("type").is_none() {
        return None;
    }

    Some(Signature {
        schema: DetectionSchema::AnthropicLike,
        populated: extractor::join_text_blocks(blocks).is_some(),
        path: JsonPath::root().key("content"),
    })
}

fn error_signature(value: &Value) -> Option<Signature> {
    let error = value.get("error")?;
    let root = JsonPath::root().key("error");
    let (path, populated) = match error {
        Value::String(s) => (root, !s.trim().is_empty()),
        Value::Object(obj) => {
            let populated = obj
                .get("message")
                .and_then(Value::as_str)
                .is_some_and(|m| !m.trim().is_empty());
            (root.key("message"), populated)
        }
        _ => return None,
    };

    Some(Signature {
        schema: DetectionSchema::ErrorEnvelope,
        path,
        populated,
    })
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer)?.as_str().map(str::to_string)
}

fn metadata(
    schema: DetectionSchema,
    value: &Value,
) -> (Option<TokenUsage>, Option<String>, Option<String>) {
    match schema {
        DetectionSchema::OpenAiLike => (
            value.get("usage").and_then(|u| {
                TokenUsage::from_fields(u, "prompt_tokens", "completion_tokens", Some("total_tokens"))
            }),
            string_at(value, "/id"),
            string_at(value, "/choices/0/finish_reason"),
        ),
        DetectionSchema::GeminiLike => (
            value.get("usageMetadata").and_then(|u| {
                TokenUsage::from_fields(
                    u,
                    "promptTokenCount",
                    "candidatesTokenCount",
                    Some("totalTokenCount"),
                )
            }),
            string_at(value, "/responseId"),
            string_at(value, "/candidates/0/finishReason"),
        ),
        DetectionSchema::AnthropicLike => (
            value
                .get("usage")
                .and_then(|u| TokenUsage::from_fields(u, "input_tokens", "output_tokens", None)),
            string_at(value, "/id"),
            string_at(value, "/stop_reason"),
        ),
        DetectionSchema::ErrorEnvelope => (
            None,
            string_at(value, "/request_id").or_else(|| string_at(value, "/error/request_id")),
            None,
        ),
        DetectionSchema::Unknown => (None, None, None),
    }
}
