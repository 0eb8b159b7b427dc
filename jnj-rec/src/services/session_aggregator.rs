//! Session-level orchestration over a batch of audio tracks
//!
//! Runs each track through segmentation, recognition and merging with a
//! bounded track worker pool, records one outcome per track, and publishes
//! progress on the event bus.
//!
//! **Failure handling:**
//! - invalid pipeline parameters are rejected before any backend call
//! - a track-level failure is recorded and the session keeps running
//! - a fatal backend error aborts the session: the session's cancellation
//!   token is cancelled, tracks in flight or not yet started end as
//!   Cancelled, and results already recorded are kept

use crate::error::{RecognitionError, RecognitionResult};
use crate::models::{
    AudioTrack, PipelineParameters, RawDetection, RecognitionSession, SessionState,
    SessionSummary, TrackOutcome,
};
use crate::services::recognition_client::{RecognitionBackend, RecognitionClient};
use crate::services::result_merger::ResultMerger;
use crate::services::segment_recognizer::SegmentRecognizer;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use jnj_common::{EventBus, RecognitionEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runs recognition sessions
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    recognizer: SegmentRecognizer,
    merger: ResultMerger,
    parameters: PipelineParameters,
    event_bus: EventBus,
}

impl SessionAggregator {
    pub fn new(client: RecognitionClient, parameters: PipelineParameters, event_bus: EventBus) -> Self {
        Self {
            recognizer: SegmentRecognizer::from_parameters(client, &parameters),
            merger: ResultMerger::new(parameters.merge_parameters()),
            parameters,
            event_bus,
        }
    }

    /// Aggregator with a fresh client (and rate limiter) for `backend`
    pub fn with_backend(
        backend: Arc<dyn RecognitionBackend>,
        parameters: PipelineParameters,
        event_bus: EventBus,
    ) -> Self {
        let client = RecognitionClient::from_parameters(backend, &parameters);
        Self::new(client, parameters, event_bus)
    }

    pub fn parameters(&self) -> &PipelineParameters {
        &self.parameters
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Run one session over `tracks`.
    ///
    /// Always returns a summary once parameters are valid, including after a
    /// fatal abort (state `FatalAborted`). Cancelling `cancel` stops the
    /// session early; unfinished tracks are recorded as Cancelled.
    ///
    /// # Errors
    /// `InvalidSegmentConfig` for invalid parameters or duplicate track ids,
    /// before any backend call is made.
    pub async fn run(
        &self,
        name: &str,
        tracks: Vec<AudioTrack>,
        cancel: &CancellationToken,
    ) -> RecognitionResult<SessionSummary> {
        self.parameters.validate()?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = tracks.iter().find(|t| !seen.insert(t.id.as_str())) {
            return Err(RecognitionError::InvalidSegmentConfig(format!(
                "track id {} appears more than once",
                duplicate.id
            )));
        }

        let mut session = RecognitionSession::new(
            name,
            self.recognizer.backend_name(),
            self.parameters.clone(),
        );
        let session_id = session.session_id;
        for track in &tracks {
            session.submit_track(&track.id)?;
        }

        tracing::info!(
            session_id = %session_id,
            name,
            backend = %session.backend,
            tracks = tracks.len(),
            track_concurrency = self.parameters.track_concurrency,
            segment_concurrency = self.parameters.segment_concurrency,
            "Recognition session started"
        );
        if session.state == SessionState::Running {
            self.event_bus.emit_lossy(RecognitionEvent::SessionStarted {
                session_id,
                name: name.to_string(),
                total_tracks: tracks.len(),
                timestamp: Utc::now(),
            });
        }

        // Cancelled on a fatal error; also follows the caller's token
        let session_token = cancel.child_token();

        let mut results = stream::iter(tracks.iter())
            .map(|track| {
                let token = &session_token;
                async move { (track, self.process_track(session_id, track, token).await) }
            })
            .buffer_unordered(self.parameters.track_concurrency);

        while let Some((track, result)) = results.next().await {
            let outcome = match result {
                Ok(outcome) => {
                    if let TrackOutcome::Succeeded { detections, .. } = &outcome {
                        tracing::info!(
                            session_id = %session_id,
                            track_id = %track.id,
                            detections = detections.len(),
                            "Track recognized"
                        );
                        self.event_bus.emit_lossy(RecognitionEvent::TrackCompleted {
                            session_id,
                            track_id: track.id.clone(),
                            detections: detections.len(),
                            timestamp: Utc::now(),
                        });
                    }
                    outcome
                }
                Err(RecognitionError::Cancelled) => {
                    tracing::debug!(session_id = %session_id, track_id = %track.id, "Track cancelled");
                    self.event_bus.emit_lossy(RecognitionEvent::TrackCancelled {
                        session_id,
                        track_id: track.id.clone(),
                        timestamp: Utc::now(),
                    });
                    TrackOutcome::Cancelled
                }
                Err(err) => {
                    if err.is_fatal() {
                        tracing::error!(
                            session_id = %session_id,
                            track_id = %track.id,
                            error = %err,
                            "Fatal recognition error, aborting session"
                        );
                        if session.abort(err.to_string()).is_some() {
                            session_token.cancel();
                            self.event_bus.emit_lossy(RecognitionEvent::SessionAborted {
                                session_id,
                                reason: err.to_string(),
                                timestamp: Utc::now(),
                            });
                        }
                    } else {
                        tracing::warn!(
                            session_id = %session_id,
                            track_id = %track.id,
                            error_kind = %err.kind(),
                            error = %err,
                            "Track failed"
                        );
                    }
                    self.event_bus.emit_lossy(RecognitionEvent::TrackFailed {
                        session_id,
                        track_id: track.id.clone(),
                        error_kind: err.kind().to_string(),
                        message: err.to_string(),
                        timestamp: Utc::now(),
                    });
                    TrackOutcome::from_error(&err)
                }
            };

            if let Err(e) = session.record_outcome(&track.id, outcome) {
                tracing::warn!(session_id = %session_id, track_id = %track.id, error = %e, "Outcome not recorded");
            }
        }
        drop(results);

        session.close();
        let summary = session.summary();

        match summary.state {
            SessionState::FatalAborted => tracing::error!(
                session_id = %session_id,
                succeeded = summary.succeeded,
                failed = summary.failed,
                cancelled = summary.cancelled,
                reason = summary.fatal_error.as_deref().unwrap_or_default(),
                "Recognition session aborted"
            ),
            _ => {
                tracing::info!(
                    session_id = %session_id,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    cancelled = summary.cancelled,
                    detections = summary.detections.len(),
                    "Recognition session completed"
                );
                self.event_bus.emit_lossy(RecognitionEvent::SessionCompleted {
                    session_id,
                    succeeded: summary.succeeded,
                    failed: summary.failed,
                    cancelled: summary.cancelled,
                    timestamp: Utc::now(),
                });
            }
        }

        Ok(summary)
    }

    /// Segment, recognize and merge one track
    async fn process_track(
        &self,
        session_id: Uuid,
        track: &AudioTrack,
        cancel: &CancellationToken,
    ) -> RecognitionResult<TrackOutcome> {
        if cancel.is_cancelled() {
            return Err(RecognitionError::Cancelled);
        }

        let segments = self.recognizer.plan(track)?;
        let segment_count = segments.len();

        tracing::debug!(
            session_id = %session_id,
            track_id = %track.id,
            duration_ms = track.duration_ms,
            segments = segment_count,
            "Track started"
        );
        self.event_bus.emit_lossy(RecognitionEvent::TrackStarted {
            session_id,
            track_id: track.id.clone(),
            segment_count,
            timestamp: Utc::now(),
        });

        let raw = self
            .recognizer
            .recognize_segments(track, segments, cancel, |detection: &RawDetection| {
                self.event_bus.emit_lossy(RecognitionEvent::SegmentRecognized {
                    session_id,
                    track_id: track.id.clone(),
                    segment_index: detection.segment.index,
                    start_ms: detection.segment.start_ms,
                    end_ms: detection.segment.end_ms,
                    title: detection.track.as_ref().map(|t| t.title.clone()),
                    confidence: detection.confidence,
                    timestamp: Utc::now(),
                });
            })
            .await?;

        let recognized_segments = raw.iter().filter(|d| d.is_match()).count();
        let detections = self.merger.merge(raw);

        Ok(TrackOutcome::Succeeded {
            detections,
            segments: segment_count,
            recognized_segments,
        })
    }
}
