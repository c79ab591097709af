//! Error classification for failed or error-bearing responses.
//!
//! Classification follows a strict precedence:
//! 1. Keywords in the provider's message (most specific signal)
//! 2. Structured fields: `status` enums, then `type`/`code` strings
//! 3. The HTTP status, or a numeric `error.code` when the HTTP status is
//!    absent or 2xx
//!
//! Ambiguous signals resolve to [`ErrorKind::Unknown`] instead of being
//! forced into a bucket.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// Failure taxonomy shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Usage quota used up.
    QuotaExceeded,
    /// Too many requests in a short window.
    RateLimited,
    /// Account balance or credits exhausted.
    InsufficientFunds,
    /// Missing, invalid or unauthorised credentials.
    AuthFailed,
    /// The requested model does not exist or is unavailable.
    ModelNotFound,
    /// Prompt exceeds the model's context window.
    ContextTooLong,
    /// Provider-side failure.
    ServerError,
    /// The response could not be interpreted.
    ParseError,
    /// No response was received at all.
    NetworkError,
    /// An error that fits no other bucket.
    Unknown,
}

impl ErrorKind {
    /// The fixed user-facing message for this kind.
    pub const fn user_message(self) -> &'static str {
        match self {
            ErrorKind::QuotaExceeded => {
                "You have exceeded your usage quota for this provider. Check your plan or wait for the quota to reset."
            }
            ErrorKind::RateLimited => {
                "The provider is rate limiting requests. Please wait a moment and try again."
            }
            ErrorKind::InsufficientFunds => {
                "Your account with this provider has insufficient funds or credits."
            }
            ErrorKind::AuthFailed => {
                "Authentication failed. Check that your API key is valid and has access to this model."
            }
            ErrorKind::ModelNotFound => {
                "The requested model was not found or is not available to your account."
            }
            ErrorKind::ContextTooLong => {
                "The conversation is too long for this model's context window. Shorten the input and try again."
            }
            ErrorKind::ServerError => {
                "The provider reported a server error. Please try again later."
            }
            ErrorKind::ParseError => {
                "The response could not be interpreted. Use the raw response view to inspect the payload."
            }
            ErrorKind::NetworkError => {
                "No response was received from the provider. Check your network connection."
            }
            ErrorKind::Unknown => "The provider returned an error that could not be classified.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}

/// Result of classifying a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// The bucket.
    pub kind: ErrorKind,
    /// The provider's own message when present, otherwise the kind's
    /// fixed message.
    pub message: String,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, provider_message: Option<String>) -> Self {
        Self {
            kind,
            message: provider_message.unwrap_or_else(|| kind.user_message().to_string()),
        }
    }
}

/// Keyword groups, checked in this order.
static KEYWORD_GROUPS: Lazy<Vec<(ErrorKind, Regex)>> = Lazy::new(|| {
    let group = |kind, pattern: &str| {
        (
            kind,
            Regex::new(pattern).expect("Invalid error keyword pattern"),
        )
    };
    vec![
        group(
            ErrorKind::QuotaExceeded,
            r"\bquota\b|\bexceeded your current\b|\bbilling hard limit\b|\bmonthly (?:usage )?limit\b",
        ),
        group(
            ErrorKind::RateLimited,
            r"\brate[ _-]?limit(?:s|ed|ing)?\b|\btoo many requests\b|\brequests per (?:minute|second|min|day)\b|\bthrottl(?:e|ed|es|ing)\b",
        ),
        group(
            ErrorKind::InsufficientFunds,
            r"\binsufficient (?:funds|balance|credits?)\b|\bcredit balance\b|\bout of credits\b|\bpayment required\b|\bnot enough (?:credits|balance)\b|\btop[ -]up\b|\bbilling\b",
        ),
        group(
            ErrorKind::AuthFailed,
            r"\bapi[ _-]?key\b|\bunauthori[sz]ed\b|\bauthentication\b|\bpermission denied\b|\bforbidden\b|\baccess denied\b|\binvalid token\b|\bnot authorized\b|\bcredentials\b",
        ),
        // "model", at most one (possibly quoted) model name, then a missing/unknown verdict.
        group(
            ErrorKind::ModelNotFound,
            r#"\bmodels?\b:?(?:\s*[/`'"]?[\w./:-]*[`'"]?)?\s+(?:(?:is|was)\s+)?(?:not found|does not exist|doesn't exist|not supported|unsupported|decommissioned)\b|\b(?:unknown|invalid|no such) model\b|\bmodel_not_found\b"#,
        ),
        group(
            ErrorKind::ContextTooLong,
            r"\bcontext (?:length|window)\b|\bmaximum context\b|\btoo many tokens\b|\btoken limit\b|\bprompt is too long\b|\binput is too long\b|\breduce the length\b|\bcontext_length_exceeded\b|\brequest too large\b",
        ),
    ]
});

/// Signals pulled out of an error-bearing document.
#[derive(Debug, Default)]
struct ErrorFields {
    message: Option<String>,
    status: Option<String>,
    kind_tags: Vec<String>,
    numeric_code: Option<u16>,
}

impl ErrorFields {
    fn from_value(value: &Value) -> Self {
        let mut fields = Self::default();
        match value.get("error") {
            Some(Value::String(s)) => fields.message = Some(s.clone()),
            Some(Value::Object(obj)) => {
                fields.message = obj.get("message").and_then(Value::as_str).map(str::to_string);
                fields.status = obj.get("status").and_then(Value::as_str).map(str::to_string);
                for key in ["type", "code"] {
                    match obj.get(key) {
                        Some(Value::String(tag)) => fields.kind_tags.push(tag.clone()),
                        Some(Value::Number(n)) => {
                            fields.numeric_code = n.as_u64().and_then(|c| u16::try_from(c).ok())
                        }
                        _ => {}
                    }
                }
            }
            _ => {
                fields.message = ["message", "detail", "error_message"]
                    .iter()
                    .find_map(|key| value.get(*key).and_then(Value::as_str))
                    .map(str::to_string);
            }
        }
        fields.message = fields.message.filter(|m| !m.trim().is_empty());
        fields
    }
}

fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Step 1: keyword groups against the message.
fn classify_lexical(message: &str) -> Option<ErrorKind> {
    let normalized = normalize(message);
    KEYWORD_GROUPS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&normalized))
        .map(|(kind, _)| *kind)
}

/// Step 2a: vendor status enums (`RESOURCE_EXHAUSTED` and friends).
fn classify_status_enum(status: &str) -> Option<ErrorKind> {
    match status.to_ascii_uppercase().as_str() {
        "RESOURCE_EXHAUSTED" => Some(ErrorKind::RateLimited),
        "PERMISSION_DENIED" | "UNAUTHENTICATED" => Some(ErrorKind::AuthFailed),
        "NOT_FOUND" => Some(ErrorKind::ModelNotFound),
        "UNAVAILABLE" | "INTERNAL" | "DEADLINE_EXCEEDED" => Some(ErrorKind::ServerError),
        _ => None,
    }
}

/// Step 2b: `type`/`code` tags such as `insufficient_quota`.
fn classify_tag(tag: &str) -> Option<ErrorKind> {
    match tag.to_ascii_lowercase().as_str() {
        "insufficient_quota" | "quota_exceeded" => Some(ErrorKind::QuotaExceeded),
        "rate_limit_exceeded" | "rate_limit_error" | "rate_limited" => Some(ErrorKind::RateLimited),
        "insufficient_funds" | "billing_error" | "payment_required" => {
            Some(ErrorKind::InsufficientFunds)
        }
        "authentication_error" | "invalid_api_key" | "permission_error" | "unauthorized" => {
            Some(ErrorKind::AuthFailed)
        }
        "not_found_error" | "model_not_found" => Some(ErrorKind::ModelNotFound),
        "context_length_exceeded" | "request_too_large" => Some(ErrorKind::ContextTooLong),
        "overloaded_error" | "api_error" | "server_error" | "internal_error" => {
            Some(ErrorKind::ServerError)
        }
        _ => None,
    }
}

/// Step 3: HTTP status buckets.
pub fn classify_http_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::AuthFailed,
        402 => ErrorKind::InsufficientFunds,
        404 => ErrorKind::ModelNotFound,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    }
}

/// Classifies a failure from the parsed body and the HTTP status.
///
/// With neither input present the failure happened below HTTP and the
/// result is [`ErrorKind::NetworkError`].
///
/// # Examples
///
/// ```
/// use replyparse::classify::{classify, ErrorKind};
/// use serde_json::json;
///
/// let body = json!({"error": {"message": "Rate limit exceeded, please retry"}});
/// assert_eq!(classify(Some(&body), Some(429)).kind, ErrorKind::RateLimited);
/// assert_eq!(classify(None, None).kind, ErrorKind::NetworkError);
/// assert_eq!(classify(Some(&json!({})), Some(500)).kind, ErrorKind::ServerError);
/// ```
pub fn classify(value: Option<&Value>, http_status: Option<u16>) -> ClassifiedError {
    if value.is_none() && http_status.is_none() {
        return ClassifiedError::new(ErrorKind::NetworkError, None);
    }

    let fields = value.map(ErrorFields::from_value).unwrap_or_default();

    let kind = fields
        .message
        .as_deref()
        .and_then(classify_lexical)
        .or_else(|| fields.status.as_deref().and_then(classify_status_enum))
        .or_else(|| fields.kind_tags.iter().find_map(|tag| classify_tag(tag)))
        .or_else(|| {
            let status = http_status
                .filter(|s| !(200..300).contains(s))
                .or(fields.numeric_code)?;
            Some(classify_http_status(status))
        })
        .unwrap_or(ErrorKind::Unknown);

    ClassifiedError::new(kind, fields.message)
}

/// Classifies from a raw body. A blank or absent body counts as absent;
/// a body that is not JSON is classified on the HTTP status alone.
pub fn classify_raw(body: Option<&str>, http_status: Option<u16>) -> ClassifiedError {
    let body = body.filter(|b| !b.trim().is_empty());
    match body {
        None => classify(None, http_status),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => classify(Some(&value), http_status),
            Err(_) => classify(Some(&Value::Null), http_status),
        },
    }
}
