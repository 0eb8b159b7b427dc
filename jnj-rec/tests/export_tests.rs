//! End-to-end export tests: WAV files in, JSON/CSV/playlist files out

mod helpers;

use async_trait::async_trait;
use helpers::{fast_parameters, generate_test_wav, memory_track, AudioConfig, Reply, ScriptedBackend};
use jnj_common::EventBus;
use jnj_rec::audio::WavSource;
use jnj_rec::error::BackendError;
use jnj_rec::export::{playlist, render, write_export, ExportFormat};
use jnj_rec::models::{SessionState, SessionSummary, TrackMatch};
use jnj_rec::services::{BackendResponse, RecognitionBackend, SessionAggregator};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Decodes each uploaded WAV and names the song after the window length
struct WavInspectingBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl RecognitionBackend for WavInspectingBackend {
    fn name(&self) -> &str {
        "wav-inspector"
    }

    async fn identify(&self, audio: &[u8]) -> Result<BackendResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reader = hound::WavReader::new(Cursor::new(audio.to_vec()))
            .map_err(|e| BackendError::Rejected(e.to_string()))?;
        let seconds = reader.duration() / reader.spec().sample_rate;

        let mut track = if seconds >= 30 {
            TrackMatch::new("Full Window", "Tone Generator")
        } else {
            TrackMatch::new("Tail, Part 2", "Tone Generator")
        };
        track.spotify_id = Some("4uLU6hMCjMI75M1A2tKUQC".to_string());
        Ok(BackendResponse::matched(
            track,
            0.75,
            serde_json::json!({ "seconds": seconds }),
        ))
    }
}

#[tokio::test]
async fn wav_session_exports_all_formats() {
    let dir = tempfile::tempdir().unwrap();
    let wav = generate_test_wav(
        &dir.path().join("set.wav"),
        &AudioConfig {
            duration_seconds: 95.0,
            ..AudioConfig::default()
        },
    )
    .unwrap();

    let track = WavSource::open(&wav).unwrap().into_track();
    assert_eq!(track.duration_ms, 95_000);

    let backend = Arc::new(WavInspectingBackend {
        calls: AtomicUsize::new(0),
    });
    let aggregator =
        SessionAggregator::with_backend(backend.clone(), fast_parameters(), EventBus::default());
    let summary = aggregator
        .run("wav", vec![track], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.state, SessionState::Completed);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    // Three full windows then the 20 s tail
    assert_eq!(summary.detections.len(), 2);
    assert_eq!(summary.detections[0].title(), "Full Window");
    assert_eq!(summary.detections[0].end_ms, 80_000);
    assert_eq!(summary.detections[1].title(), "Tail, Part 2");
    assert_eq!(summary.detections[1].start_ms, 75_000);

    // JSON round trip
    let json_path = dir.path().join("out").join("summary.json");
    write_export(&summary, ExportFormat::Json, &json_path).unwrap();
    let parsed: SessionSummary =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(parsed.session_id, summary.session_id);
    assert_eq!(parsed.detections, summary.detections);

    // CSV: header plus one row per detection, comma in title quoted
    let csv_path = dir.path().join("summary.csv");
    write_export(&summary, ExportFormat::Csv, &csv_path).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("track_id,timestamp_start,timestamp_end"));
    assert!(lines[1].contains(",0:00,1:20,"));
    assert!(lines[2].contains("\"Tail, Part 2\""));
    assert!(lines[2].contains("4uLU6hMCjMI75M1A2tKUQC"));

    let playlist_json = render(&summary, ExportFormat::Playlist).unwrap();
    let entries: serde_json::Value = serde_json::from_str(&playlist_json).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 2);

    let stats = summary.statistics();
    assert_eq!(stats.total_detections, 2);
    assert_eq!(stats.unique_artists, 1);
    assert_eq!(stats.spotify_coverage, 100.0);
}

#[tokio::test(start_paused = true)]
async fn playlist_groups_songs_across_tracks() {
    let backend = ScriptedBackend::new("scripted", |window, _| {
        match (window.track_id.as_str(), window.start_ms) {
            ("night-1", start) if start < 50_000 => Reply::song("Opus", "Eric Prydz", 0.9),
            ("night-1", _) => Reply::song("Strobe", "deadmau5", 0.6),
            (_, _) => Reply::song("Opus", "Eric Prydz", 0.7),
        }
    });
    let aggregator =
        SessionAggregator::with_backend(backend, fast_parameters(), EventBus::default());

    let summary = aggregator
        .run(
            "weekend",
            vec![memory_track("night-1", 95_000), memory_track("night-2", 55_000)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(summary.detections.len(), 3);

    let entries = playlist(&summary);
    assert_eq!(entries.len(), 2);

    // (0.9 + 0.7) / 2 = 0.8 beats 0.6
    assert_eq!(entries[0].title, "Opus");
    assert_eq!(entries[0].occurrences.len(), 2);
    assert!((entries[0].average_confidence - 0.8).abs() < 1e-9);
    assert_eq!(entries[0].occurrences[0].track_id, "night-1");
    assert_eq!(entries[0].occurrences[1].track_id, "night-2");
    assert_eq!(entries[1].title, "Strobe");
    assert_eq!(entries[1].occurrences[0].timestamp, "0:50");

    let stats = summary.statistics();
    assert_eq!(stats.unique_songs, 2);
    assert_eq!(stats.tracks_with_detections, 2);
    assert_eq!(stats.top_songs[0], ("Opus".to_string(), 2));
}
