//! Pipeline parameters
//!
//! Flat, TOML-friendly parameter set (seconds for geometry, milliseconds for
//! timing) plus the derived per-component views: [`SegmentConfig`],
//! [`RetryPolicy`], [`MergeParameters`].

use crate::error::{RecognitionError, RecognitionResult};
use crate::models::segment::SegmentConfig;
use jnj_common::time::seconds_to_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for either worker pool
pub const MAX_CONCURRENCY: usize = 16;

/// Upper bound for the retry attempt ceiling
pub const MAX_ATTEMPTS: u32 = 10;

/// Recognition pipeline parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParameters {
    /// Segment window length in seconds (default: 30)
    #[serde(default = "default_segment_length_s")]
    pub segment_length_s: f64,

    /// Overlap between consecutive windows in seconds (default: 5)
    #[serde(default = "default_overlap_s")]
    pub overlap_s: f64,

    /// Shortest final window worth submitting, in seconds (default: 5)
    #[serde(default = "default_min_segment_s")]
    pub min_segment_s: f64,

    /// Tracks processed concurrently within a session (default: 2)
    #[serde(default = "default_track_concurrency")]
    pub track_concurrency: usize,

    /// Segment calls in flight per track (default: 2)
    #[serde(default = "default_segment_concurrency")]
    pub segment_concurrency: usize,

    /// Attempts per segment call, first try included (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds (default: 500)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds (default: 8000)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff growth factor (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Minimum spacing between calls on one credential, ms (default: 1000)
    #[serde(default = "default_rate_limit_spacing_ms")]
    pub rate_limit_spacing_ms: u64,

    /// Timeout for one backend call in milliseconds (default: 20000)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Extra gap in seconds still bridged when merging same-track hits (default: 0)
    #[serde(default)]
    pub merge_gap_tolerance_s: f64,

    /// Maximum overlap in seconds between two merged entries (default: overlap_s)
    #[serde(default)]
    pub overlap_tolerance_s: Option<f64>,

    /// Similarity above which differing neighbours are flagged for review (default: 0.85)
    #[serde(default = "default_review_similarity")]
    pub review_similarity: f64,
}

/// Retry and timeout policy for one segment call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, where `attempt` is 1-based
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        PipelineParameters::default().retry_policy()
    }
}

/// Result merger tolerances
#[derive(Debug, Clone, PartialEq)]
pub struct MergeParameters {
    /// Natural overlap of consecutive segments
    pub overlap_ms: u64,
    /// Extra gap bridged between same-track hits
    pub gap_tolerance_ms: u64,
    /// Largest overlap allowed between two output entries
    pub overlap_tolerance_ms: u64,
    /// Normalized similarity threshold for near-duplicate review flags
    pub review_similarity: f64,
}

impl Default for MergeParameters {
    fn default() -> Self {
        PipelineParameters::default().merge_parameters()
    }
}

fn default_segment_length_s() -> f64 {
    30.0
}

fn default_overlap_s() -> f64 {
    5.0
}

fn default_min_segment_s() -> f64 {
    5.0
}

fn default_track_concurrency() -> usize {
    2
}

fn default_segment_concurrency() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_rate_limit_spacing_ms() -> u64 {
    1000
}

fn default_call_timeout_ms() -> u64 {
    20_000
}

fn default_review_similarity() -> f64 {
    0.85
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self {
            segment_length_s: default_segment_length_s(),
            overlap_s: default_overlap_s(),
            min_segment_s: default_min_segment_s(),
            track_concurrency: default_track_concurrency(),
            segment_concurrency: default_segment_concurrency(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            rate_limit_spacing_ms: default_rate_limit_spacing_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            merge_gap_tolerance_s: 0.0,
            overlap_tolerance_s: None,
            review_similarity: default_review_similarity(),
        }
    }
}

impl PipelineParameters {
    /// Segment geometry in milliseconds
    pub fn segment_config(&self) -> SegmentConfig {
        SegmentConfig {
            segment_length_ms: seconds_to_ms(self.segment_length_s),
            overlap_ms: seconds_to_ms(self.overlap_s),
            min_segment_ms: seconds_to_ms(self.min_segment_s),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.backoff_multiplier,
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }

    pub fn merge_parameters(&self) -> MergeParameters {
        let overlap_ms = seconds_to_ms(self.overlap_s);
        MergeParameters {
            overlap_ms,
            gap_tolerance_ms: seconds_to_ms(self.merge_gap_tolerance_s),
            overlap_tolerance_ms: self
                .overlap_tolerance_s
                .map(seconds_to_ms)
                .unwrap_or(overlap_ms),
            review_similarity: self.review_similarity,
        }
    }

    pub fn rate_limit_spacing(&self) -> Duration {
        Duration::from_millis(self.rate_limit_spacing_ms)
    }

    /// Reject unusable parameter sets before any backend call is made
    pub fn validate(&self) -> RecognitionResult<()> {
        let finite = [
            ("segment_length_s", self.segment_length_s),
            ("overlap_s", self.overlap_s),
            ("min_segment_s", self.min_segment_s),
            ("merge_gap_tolerance_s", self.merge_gap_tolerance_s),
            ("backoff_multiplier", self.backoff_multiplier),
            ("review_similarity", self.review_similarity),
        ];
        for (name, value) in finite {
            if !value.is_finite() || value < 0.0 {
                return Err(RecognitionError::InvalidSegmentConfig(format!(
                    "{} must be a non-negative number (got {})",
                    name, value
                )));
            }
        }

        self.segment_config().validate()?;

        if !(1..=MAX_CONCURRENCY).contains(&self.track_concurrency) {
            return Err(RecognitionError::InvalidSegmentConfig(format!(
                "track_concurrency must be between 1 and {} (got {})",
                MAX_CONCURRENCY, self.track_concurrency
            )));
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.segment_concurrency) {
            return Err(RecognitionError::InvalidSegmentConfig(format!(
                "segment_concurrency must be between 1 and {} (got {})",
                MAX_CONCURRENCY, self.segment_concurrency
            )));
        }
        if !(1..=MAX_ATTEMPTS).contains(&self.max_attempts) {
            return Err(RecognitionError::InvalidSegmentConfig(format!(
                "max_attempts must be between 1 and {} (got {})",
                MAX_ATTEMPTS, self.max_attempts
            )));
        }
        if self.call_timeout_ms == 0 {
            return Err(RecognitionError::InvalidSegmentConfig(
                "call_timeout_ms must be positive".to_string(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(RecognitionError::InvalidSegmentConfig(format!(
                "backoff_multiplier must be at least 1.0 (got {})",
                self.backoff_multiplier
            )));
        }
        if self.review_similarity > 1.0 {
            return Err(RecognitionError::InvalidSegmentConfig(format!(
                "review_similarity must be within 0.0-1.0 (got {})",
                self.review_similarity
            )));
        }
        if let Some(tolerance) = self.overlap_tolerance_s {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(RecognitionError::InvalidSegmentConfig(format!(
                    "overlap_tolerance_s must be a non-negative number (got {})",
                    tolerance
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = PipelineParameters::default();
        assert!(params.validate().is_ok());

        let segments = params.segment_config();
        assert_eq!(segments.segment_length_ms, 30_000);
        assert_eq!(segments.overlap_ms, 5_000);
        assert_eq!(segments.min_segment_ms, 5_000);
    }

    #[test]
    fn test_partial_toml_uses_field_defaults() {
        let params: PipelineParameters =
            toml::from_str("segment_length_s = 20.0\ntrack_concurrency = 4").unwrap();
        assert_eq!(params.segment_length_s, 20.0);
        assert_eq!(params.track_concurrency, 4);
        assert_eq!(params.overlap_s, 5.0);
        assert_eq!(params.max_attempts, 3);
        assert_eq!(params.overlap_tolerance_s, None);
    }

    #[test]
    fn test_overlap_must_be_shorter_than_segment() {
        let params = PipelineParameters {
            segment_length_s: 10.0,
            overlap_s: 10.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RecognitionError::InvalidSegmentConfig(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let params = PipelineParameters {
            segment_concurrency: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = PipelineParameters {
            track_concurrency: MAX_CONCURRENCY + 1,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_attempt_ceiling_bounds() {
        let params = PipelineParameters {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = PipelineParameters {
            max_attempts: MAX_ATTEMPTS,
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_negative_values_rejected() {
        let params = PipelineParameters {
            overlap_s: -1.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = PipelineParameters {
            overlap_tolerance_s: Some(f64::NAN),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            call_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(9), Duration::from_millis(500));
    }

    #[test]
    fn test_overlap_tolerance_defaults_to_overlap() {
        let merge = PipelineParameters::default().merge_parameters();
        assert_eq!(merge.overlap_tolerance_ms, 5_000);

        let merge = PipelineParameters {
            overlap_tolerance_s: Some(2.5),
            ..Default::default()
        }
        .merge_parameters();
        assert_eq!(merge.overlap_tolerance_ms, 2_500);
    }
}
