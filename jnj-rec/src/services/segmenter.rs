//! Fixed-length overlapping segmentation of one audio track
//!
//! Windows start every `segment_length - overlap` ms from 0. The last window
//! is truncated at the track end and kept only when it is at least
//! `min_segment_ms` long, unless it is the track's only window.

use crate::error::{RecognitionError, RecognitionResult};
use crate::models::{Segment, SegmentConfig};

/// Slice `[0, duration_ms)` into overlapping windows
pub fn segment(
    track_id: &str,
    duration_ms: u64,
    config: &SegmentConfig,
) -> RecognitionResult<Vec<Segment>> {
    config.validate()?;
    if duration_ms == 0 {
        return Err(RecognitionError::InvalidSegmentConfig(format!(
            "track {} has zero duration",
            track_id
        )));
    }

    let stride = config.stride_ms();
    let mut segments = Vec::with_capacity((duration_ms / stride + 1) as usize);
    let mut start = 0u64;

    while start < duration_ms {
        let end = (start + config.segment_length_ms).min(duration_ms);
        let truncated = end - start < config.segment_length_ms;

        if truncated && end - start < config.min_segment_ms && !segments.is_empty() {
            tracing::debug!(
                track_id = %track_id,
                start_ms = start,
                length_ms = end - start,
                "Dropping short final segment"
            );
            break;
        }

        segments.push(Segment {
            track_id: track_id.to_string(),
            index: segments.len(),
            start_ms: start,
            end_ms: end,
        });

        if end == duration_ms {
            break;
        }
        start += stride;
    }

    Ok(segments)
}
