//! Learned (provider, model) → content path records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::JsonPath;

/// Failure count a hint must exceed before it can be retired.
pub const RETIRE_FAILURE_THRESHOLD: u32 = 5;

/// Reliability below which a hint with enough failures is retired.
pub const RETIRE_RELIABILITY: f64 = 0.5;

/// Reliability reported before any use has been recorded.
pub const NEUTRAL_RELIABILITY: f64 = 0.5;

/// Storage key of a hint. `model_id == None` covers every model of the
/// provider that has no more specific hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HintKey {
    /// Provider identifier, e.g. `"openrouter"`.
    pub provider_id: String,
    /// Model identifier, or `None` for a provider-wide hint.
    pub model_id: Option<String>,
}

impl HintKey {
    /// Creates a key.
    pub fn new(provider_id: impl Into<String>, model_id: Option<&str>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.map(str::to_string),
        }
    }

    /// The provider-wide key for the same provider.
    pub fn provider_wide(&self) -> Self {
        Self {
            provider_id: self.provider_id.clone(),
            model_id: None,
        }
    }
}

impl fmt::Display for HintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model_id {
            Some(model) => write!(f, "{}/{}", self.provider_id, model),
            None => write!(f, "{}/*", self.provider_id),
        }
    }
}

/// A content path taught by a human for one provider (and optionally model).
///
/// Values are immutable snapshots: the counter helpers return updated copies
/// and the [`FormatHintStore`](super::FormatHintStore) decides what is
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatHint {
    /// Provider identifier.
    pub provider_id: String,
    /// Model identifier, `None` for provider-wide.
    pub model_id: Option<String>,
    /// Where the answer text lives.
    pub content_path: JsonPath,
    /// When the hint was taught.
    pub created_at: DateTime<Utc>,
    /// When the hint was last tried.
    pub last_used: DateTime<Utc>,
    /// Extractions that succeeded at this path.
    pub success_count: u32,
    /// Extractions that failed at this path.
    pub failure_count: u32,
}

impl FormatHint {
    /// Creates a fresh hint with zeroed counters.
    ///
    /// # Examples
    ///
    /// ```
    /// use replyparse::hints::FormatHint;
    ///
    /// let hint = FormatHint::new("acme", Some("acme-large"), "data.reply".parse().unwrap());
    /// assert_eq!(hint.reliability_score(), 0.5);
    /// assert!(!hint.should_retire());
    /// ```
    pub fn new(provider_id: impl Into<String>, model_id: Option<&str>, content_path: JsonPath) -> Self {
        let now = Utc::now();
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.map(str::to_string),
            content_path,
            created_at: now,
            last_used: now,
            success_count: 0,
            failure_count: 0,
        }
    }

    /// The storage key.
    pub fn key(&self) -> HintKey {
        HintKey {
            provider_id: self.provider_id.clone(),
            model_id: self.model_id.clone(),
        }
    }

    /// `success / (success + failure)`, or 0.5 before any use.
    pub fn reliability_score(&self) -> f64 {
        let total = u64::from(self.success_count) + u64::from(self.failure_count);
        if total == 0 {
            return NEUTRAL_RELIABILITY;
        }
        f64::from(self.success_count) / total as f64
    }

    /// Retirement is evaluated on read and never stored, so a hint can
    /// recover if later uses succeed.
    pub fn should_retire(&self) -> bool {
        self.failure_count > RETIRE_FAILURE_THRESHOLD && self.reliability_score() < RETIRE_RELIABILITY
    }

    /// Copy with one more success and a refreshed `last_used`.
    pub fn with_success(&self) -> Self {
        Self {
            success_count: self.success_count.saturating_add(1),
            last_used: Utc::now(),
            ..self.clone()
        }
    }

    /// Copy with one more failure and a refreshed `last_used`.
    pub fn with_failure(&self) -> Self {
        Self {
            failure_count: self.failure_count.saturating_add(1),
            last_used: Utc::now(),
            ..self.clone()
        }
    }

    /// Copy with both counters zeroed.
    pub fn reset(&self) -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            ..self.clone()
        }
    }
}
