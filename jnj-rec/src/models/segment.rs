//! Segment window model

use crate::error::{RecognitionError, RecognitionResult};
use jnj_common::time::{format_range, ms_to_seconds};
use serde::{Deserialize, Serialize};

/// Segment geometry in whole milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub segment_length_ms: u64,
    pub overlap_ms: u64,
    /// A truncated final window shorter than this is dropped
    pub min_segment_ms: u64,
}

impl SegmentConfig {
    /// Distance between consecutive window starts
    pub fn stride_ms(&self) -> u64 {
        self.segment_length_ms.saturating_sub(self.overlap_ms)
    }

    pub fn validate(&self) -> RecognitionResult<()> {
        if self.segment_length_ms == 0 {
            return Err(RecognitionError::InvalidSegmentConfig(
                "segment length must be positive".to_string(),
            ));
        }
        if self.overlap_ms >= self.segment_length_ms {
            return Err(RecognitionError::InvalidSegmentConfig(format!(
                "overlap ({} ms) must be shorter than segment length ({} ms)",
                self.overlap_ms, self.segment_length_ms
            )));
        }
        Ok(())
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            segment_length_ms: 30_000,
            overlap_ms: 5_000,
            min_segment_ms: 5_000,
        }
    }
}

/// One time window of an audio track, `[start_ms, end_ms)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub track_id: String,
    /// Zero-based sequence index within the track
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Segment {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }

    pub fn start_seconds(&self) -> f64 {
        ms_to_seconds(self.start_ms)
    }

    pub fn end_seconds(&self) -> f64 {
        ms_to_seconds(self.end_ms)
    }

    /// Human-readable `M:SS-M:SS` label for logs and exports
    pub fn label(&self) -> String {
        format_range(self.start_ms, self.end_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride() {
        let config = SegmentConfig::default();
        assert_eq!(config.stride_ms(), 25_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_overlap_is_valid() {
        let config = SegmentConfig {
            segment_length_ms: 10_000,
            overlap_ms: 0,
            min_segment_ms: 0,
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.stride_ms(), 10_000);
    }

    #[test]
    fn test_invalid_geometry() {
        let zero_length = SegmentConfig {
            segment_length_ms: 0,
            overlap_ms: 0,
            min_segment_ms: 0,
        };
        assert!(zero_length.validate().is_err());

        let overlap_too_long = SegmentConfig {
            segment_length_ms: 10_000,
            overlap_ms: 12_000,
            min_segment_ms: 0,
        };
        assert!(overlap_too_long.validate().is_err());
    }

    #[test]
    fn test_segment_accessors() {
        let segment = Segment {
            track_id: "video-1".to_string(),
            index: 1,
            start_ms: 25_000,
            end_ms: 55_000,
        };
        assert_eq!(segment.duration_ms(), 30_000);
        assert_eq!(segment.start_seconds(), 25.0);
        assert_eq!(segment.end_seconds(), 55.0);
        assert_eq!(segment.label(), "0:25-0:55");
    }
}
