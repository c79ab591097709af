//! Tuning knobs for the ranker and the scenario thresholds.
//!
//! All structs deserialize with `#[serde(default)]`, so a settings layer can
//! supply only the values it wants to override.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, InvalidSetting};

/// Default maximum nesting depth the ranker descends into.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Default maximum number of JSON nodes the ranker visits.
pub const DEFAULT_MAX_NODES: usize = 10_000;

/// Default number of candidates kept after ranking.
pub const DEFAULT_MAX_CANDIDATES: usize = 10;

/// Limits and weights for the heuristic candidate ranker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Containers nested deeper than this are not entered.
    pub max_depth: usize,
    /// Traversal stops after visiting this many nodes.
    pub max_nodes: usize,
    /// Ranked list is truncated to this length.
    pub max_candidates: usize,
    /// Strings shorter than this (in chars, trimmed) are never candidates.
    pub min_length: usize,
    /// Length beyond this many chars adds no further score.
    pub length_cap: usize,
    /// Nesting depth at which the depth penalty starts.
    pub depth_penalty_start: usize,
    /// Penalty per level beyond `depth_penalty_start`.
    pub depth_penalty: i64,
    /// Length of the display preview in chars.
    pub preview_chars: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            min_length: 3,
            length_cap: 240,
            depth_penalty_start: 3,
            depth_penalty: 8,
            preview_chars: 80,
        }
    }
}

impl RankerConfig {
    /// Creates the default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the number of candidates kept.
    #[inline]
    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Overrides the traversal caps.
    #[inline]
    pub fn with_limits(mut self, max_depth: usize, max_nodes: usize) -> Self {
        self.max_depth = max_depth;
        self.max_nodes = max_nodes;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |setting, reason: &str| {
            Err(ConfigError::InvalidConfig(InvalidSetting::new(setting, reason)))
        };
        if self.max_nodes == 0 {
            return invalid("ranker.max_nodes", "must be greater than zero");
        }
        if self.max_candidates == 0 {
            return invalid("ranker.max_candidates", "must be greater than zero");
        }
        if self.length_cap == 0 || self.min_length > self.length_cap {
            return invalid("ranker.length_cap", "must be at least min_length and non-zero");
        }
        if self.depth_penalty < 0 {
            return invalid("ranker.depth_penalty", "must not be negative");
        }
        Ok(())
    }
}

/// Score thresholds mapping the ranker's top candidate to a [`Confidence`].
///
/// [`Confidence`]: crate::confidence::Confidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    /// Minimum top score for a MEDIUM guess (Scenario 2); below is LOW.
    pub medium_score: i64,
    /// Minimum lead of the top candidate over the runner-up for MEDIUM.
    pub min_margin: i64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            medium_score: 60,
            min_margin: 10,
        }
    }
}

impl ConfidenceThresholds {
    /// Creates thresholds with explicit values.
    #[inline]
    pub const fn new(medium_score: i64, min_margin: i64) -> Self {
        Self {
            medium_score,
            min_margin,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ranker limits and weights.
    pub ranker: RankerConfig,
    /// Scenario thresholds.
    pub thresholds: ConfidenceThresholds,
}

impl PipelineConfig {
    /// Parses a (possibly partial) JSON settings document and validates it.
    ///
    /// # Examples
    ///
    /// ```
    /// use replyparse::config::PipelineConfig;
    ///
    /// let config = PipelineConfig::from_json(r#"{"thresholds": {"medium_score": 10}}"#).unwrap();
    /// assert_eq!(config.thresholds.medium_score, 10);
    /// assert_eq!(config.ranker.max_candidates, 10);
    /// ```
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every limit is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ranker.validate()
    }

    /// Replaces the thresholds.
    #[inline]
    pub fn with_thresholds(mut self, thresholds: ConfidenceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Replaces the ranker configuration.
    #[inline]
    pub fn with_ranker(mut self, ranker: RankerConfig) -> Self {
        self.ranker = ranker;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_document() {
        let config = PipelineConfig::from_json(r#"{"ranker": {"max_candidates": 3}}"#).unwrap();
        assert_eq!(config.ranker.max_candidates, 3);
        assert_eq!(config.ranker.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.thresholds, ConfidenceThresholds::default());
    }

    #[test]
    fn test_rejects_zero_nodes() {
        let err = PipelineConfig::from_json(r#"{"ranker": {"max_nodes": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_min_length_over_cap() {
        let err = PipelineConfig::from_json(r#"{"ranker": {"min_length": 50, "length_cap": 10}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("length_cap"));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            PipelineConfig::from_json("{"),
            Err(ConfigError::Json(_))
        ));
    }
}
