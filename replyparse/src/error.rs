//! Error types for the hint store and configuration layer.
//!
//! The interpretation pipeline itself never fails: structural problems are
//! reported as `None` or [`ErrorKind::Unknown`](crate::classify::ErrorKind)
//! and provider failures become a [`ParsedResponse`](crate::response::ParsedResponse).
//! Only the collaborators around it surface errors.

use std::fmt;

/// Result type alias for hint store operations.
pub type Result<T> = std::result::Result<T, HintStoreError>;

/// Errors raised by a format hint persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum HintStoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A lock guarding backend state was poisoned by a panicking writer.
    #[error("Lock poisoned: {context}")]
    LockPoisoned {
        /// Which lock was poisoned.
        context: &'static str,
    },

    /// Backend-specific failure (e.g. the substrate is unavailable).
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl HintStoreError {
    /// Creates a lock-poisoned error.
    #[inline]
    pub fn poisoned(context: &'static str) -> Self {
        Self::LockPoisoned { context }
    }

    /// Creates an unavailable-backend error.
    #[inline]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Errors raised while building a [`PipelineConfig`](crate::config::PipelineConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(InvalidSetting),

    /// The configuration document is not valid JSON for the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Details of a rejected configuration value.
#[derive(Debug, Clone)]
pub struct InvalidSetting {
    /// Name of the offending setting.
    pub setting: &'static str,
    /// Why it was rejected.
    pub reason: String,
}

impl InvalidSetting {
    /// Creates a new invalid setting description.
    #[inline]
    pub fn new(setting: &'static str, reason: impl Into<String>) -> Self {
        Self {
            setting,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for InvalidSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.setting, self.reason)
    }
}
