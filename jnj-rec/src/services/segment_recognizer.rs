//! Per-track recognition driver
//!
//! Segments one track, reads each window from the track's audio source and
//! submits it through the [`RecognitionClient`] with bounded parallelism.
//!
//! - `RecognitionUnavailable` for a window becomes a no-match detection
//! - a fatal error, a cancellation or an unreadable window stops the track;
//!   dropping the stream abandons the windows still in flight
//! - output is ordered by segment index regardless of completion order

use crate::error::{RecognitionError, RecognitionResult};
use crate::models::{AudioTrack, PipelineParameters, RawDetection, Segment, SegmentConfig};
use crate::services::recognition_client::RecognitionClient;
use crate::services::segmenter;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

/// Drives segmentation and recognition over one audio track
#[derive(Debug, Clone)]
pub struct SegmentRecognizer {
    client: RecognitionClient,
    segment_config: SegmentConfig,
    concurrency: usize,
}

impl SegmentRecognizer {
    pub fn new(client: RecognitionClient, segment_config: SegmentConfig, concurrency: usize) -> Self {
        Self {
            client,
            segment_config,
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_parameters(client: RecognitionClient, parameters: &PipelineParameters) -> Self {
        Self::new(
            client,
            parameters.segment_config(),
            parameters.segment_concurrency,
        )
    }

    pub fn backend_name(&self) -> &str {
        self.client.backend_name()
    }

    /// Windows that `recognize_track` would submit for `track`
    pub fn plan(&self, track: &AudioTrack) -> RecognitionResult<Vec<Segment>> {
        segmenter::segment(&track.id, track.duration_ms, &self.segment_config)
    }

    /// Recognize every window of `track`, ordered by segment index
    pub async fn recognize_track(
        &self,
        track: &AudioTrack,
        cancel: &CancellationToken,
    ) -> RecognitionResult<Vec<RawDetection>> {
        let segments = self.plan(track)?;
        self.recognize_segments(track, segments, cancel, |_| {}).await
    }

    /// Recognize the given windows of `track`.
    ///
    /// `on_detection` sees each detection as it completes (completion order).
    pub async fn recognize_segments<F>(
        &self,
        track: &AudioTrack,
        segments: Vec<Segment>,
        cancel: &CancellationToken,
        mut on_detection: F,
    ) -> RecognitionResult<Vec<RawDetection>>
    where
        F: FnMut(&RawDetection),
    {
        let total = segments.len();
        tracing::debug!(
            track_id = %track.id,
            segments = total,
            concurrency = self.concurrency,
            "Recognizing track segments"
        );

        let mut results = stream::iter(segments)
            .map(|segment| self.recognize_segment(track, segment, cancel))
            .buffer_unordered(self.concurrency);

        let mut detections = Vec::with_capacity(total);
        while let Some(result) = results.next().await {
            let detection = result?;
            on_detection(&detection);
            detections.push(detection);
        }

        detections.sort_by_key(|d| d.segment.index);

        tracing::debug!(
            track_id = %track.id,
            segments = total,
            matched = detections.iter().filter(|d| d.is_match()).count(),
            "Track segments recognized"
        );

        Ok(detections)
    }

    async fn recognize_segment(
        &self,
        track: &AudioTrack,
        segment: Segment,
        cancel: &CancellationToken,
    ) -> RecognitionResult<RawDetection> {
        if cancel.is_cancelled() {
            return Err(RecognitionError::Cancelled);
        }

        let audio = track
            .source()
            .read_window(segment.start_ms, segment.end_ms)
            .await
            .map_err(|e| {
                RecognitionError::TrackProcessingFailed(format!(
                    "read segment {} ({}) of {}: {}",
                    segment.index,
                    segment.label(),
                    track.id,
                    e
                ))
            })?;

        let backend = self.client.backend_name();
        match self.client.recognize(&audio, cancel).await {
            Ok(response) => {
                tracing::trace!(
                    track_id = %track.id,
                    segment = segment.index,
                    matched = response.track.is_some(),
                    confidence = response.confidence,
                    "Segment recognized"
                );
                Ok(RawDetection {
                    segment,
                    track: response.track,
                    confidence: response.confidence,
                    backend: backend.to_string(),
                    raw: Some(response.raw),
                })
            }
            Err(RecognitionError::RecognitionUnavailable { attempts, source }) => {
                tracing::warn!(
                    track_id = %track.id,
                    segment = segment.index,
                    attempts,
                    error = %source,
                    "Segment unrecognized: recognition unavailable"
                );
                Ok(RawDetection::no_match(segment, backend))
            }
            Err(e) => Err(e),
        }
    }
}
