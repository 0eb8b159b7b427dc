//! jnj-rec - song recognition over long recordings
//!
//! Cuts each WAV file into overlapping windows, identifies every window with
//! the configured recognition service, and merges the results into one track
//! list per file.

use anyhow::{Context, Result};
use clap::Parser;
use jnj_common::time::format_timestamp;
use jnj_common::{EventBus, RecognitionEvent};
use jnj_rec::audio::WavSource;
use jnj_rec::config::{build_backend, BackendKind, TomlConfig};
use jnj_rec::export::{write_export, ExportFormat};
use jnj_rec::models::{AudioTrack, SessionSummary};
use jnj_rec::services::SessionAggregator;
use std::path::PathBuf;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jnj-rec", version, about = "Identify the songs played in long recordings")]
struct Args {
    /// TOML config file (default: $JNJ_CONFIG, then ~/.config/jnj/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recognition service (overrides [recognition] service)
    #[arg(long, value_enum)]
    service: Option<BackendKind>,

    /// Window length in seconds
    #[arg(long, value_name = "SECONDS")]
    segment_length: Option<f64>,

    /// Overlap between consecutive windows in seconds
    #[arg(long, value_name = "SECONDS")]
    overlap: Option<f64>,

    /// Session name used in logs and exports
    #[arg(long, default_value = "jnj-rec")]
    session_name: String,

    /// Export format
    #[arg(long, value_enum, requires = "output")]
    export: Option<ExportFormat>,

    /// Export destination
    #[arg(long, requires = "export")]
    output: Option<PathBuf>,

    /// WAV files to recognize
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load config")?;
    init_tracing(&config.logging.level);

    info!("Starting jnj-rec");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut parameters = config.recognition.parameters.clone();
    if let Some(seconds) = args.segment_length {
        parameters.segment_length_s = seconds;
    }
    if let Some(seconds) = args.overlap {
        parameters.overlap_s = seconds;
    }

    let service = args.service.unwrap_or(config.recognition.service);
    let backend = build_backend(service, &config)?;

    let tracks = open_tracks(&args.files)?;
    info!("Loaded {} track(s)", tracks.len());

    // Subscribe before anything can emit so no early event is missed
    let event_bus = EventBus::default();
    let progress = tokio::spawn(log_progress(event_bus.subscribe()));
    debug!(subscribers = event_bus.subscriber_count(), "Progress display attached");

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling session");
            ctrl_c_token.cancel();
        }
    });

    let aggregator = SessionAggregator::with_backend(backend, parameters, event_bus);
    let summary = aggregator.run(&args.session_name, tracks, &cancel).await?;

    // Dropping the last sender ends the progress task
    drop(aggregator);
    if let Ok(handled) = progress.await {
        debug!("Progress display handled {} event(s)", handled);
    }

    report(&summary);

    if let (Some(format), Some(path)) = (args.export, args.output.as_deref()) {
        write_export(&summary, format, path)
            .with_context(|| format!("Failed to export to {}", path.display()))?;
    }

    if summary.is_aborted() {
        anyhow::bail!(
            "Session aborted: {}",
            summary.fatal_error.as_deref().unwrap_or("fatal recognition error")
        );
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_tracks(files: &[PathBuf]) -> Result<Vec<AudioTrack>> {
    files
        .iter()
        .map(|path| {
            WavSource::open(path)
                .map(WavSource::into_track)
                .with_context(|| format!("Failed to open {}", path.display()))
        })
        .collect()
}

/// Log progress events until every sender is gone; returns the number received
async fn log_progress(mut rx: broadcast::Receiver<RecognitionEvent>) -> usize {
    let mut handled = 0;
    loop {
        let event = rx.recv().await;
        if event.is_ok() {
            handled += 1;
        }
        match event {
            Ok(RecognitionEvent::TrackStarted {
                track_id,
                segment_count,
                ..
            }) => info!("{}: {} segment(s) queued", track_id, segment_count),
            Ok(RecognitionEvent::SegmentRecognized {
                track_id,
                start_ms,
                title: Some(title),
                confidence,
                ..
            }) => info!(
                "{} @ {}: {} ({:.2})",
                track_id,
                format_timestamp(start_ms),
                title,
                confidence
            ),
            Ok(RecognitionEvent::TrackFailed {
                track_id, message, ..
            }) => warn!("{}: {}", track_id, message),
            Ok(RecognitionEvent::SessionAborted { reason, .. }) => {
                error!("Session aborted: {}", reason)
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("Progress display skipped {} event(s)", skipped)
            }
            Err(RecvError::Closed) => break,
        }
    }
    handled
}

fn report(summary: &SessionSummary) {
    let mut current_track = None;
    for detection in &summary.detections {
        if current_track != Some(detection.track_id.as_str()) {
            info!("== {} ==", detection.track_id);
            current_track = Some(detection.track_id.as_str());
        }
        let review = if detection.needs_review() { " [review]" } else { "" };
        info!(
            "{:>8} - {:<8} {} - {} ({:.2}, {} segment(s)){}",
            format_timestamp(detection.start_ms),
            format_timestamp(detection.end_ms),
            detection.artist(),
            detection.title(),
            detection.confidence,
            detection.supporting_count,
            review
        );
    }

    for failure in &summary.failures {
        warn!("{} failed ({}): {}", failure.track_id, failure.kind, failure.message);
    }

    info!(
        "Tracks: {} succeeded, {} failed, {} cancelled of {}",
        summary.succeeded, summary.failed, summary.cancelled, summary.total_tracks
    );
    info!(
        "Segments: {} recognized of {} submitted",
        summary.segments_recognized, summary.segments_submitted
    );

    let stats = summary.statistics();
    info!(
        "Detections: {} ({} unique songs, {} unique artists), average confidence {:.2} (std {:.2}), Spotify coverage {:.1}%",
        stats.total_detections,
        stats.unique_songs,
        stats.unique_artists,
        stats.average_confidence,
        stats.confidence_std,
        stats.spotify_coverage
    );
    if stats.needs_review > 0 {
        warn!("{} detection(s) flagged for review", stats.needs_review);
    }
}
