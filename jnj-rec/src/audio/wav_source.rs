//! PCM WAV file audio source
//!
//! Windows are cut on frame boundaries and re-encoded as standalone WAV
//! buffers with the source's own format, ready for upload.

use crate::models::{AudioSource, AudioSourceError, AudioTrack};
use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Audio source backed by a WAV file on disk
#[derive(Debug, Clone)]
pub struct WavSource {
    path: PathBuf,
    spec: WavSpec,
    /// Frames (samples per channel) in the file
    frames: u32,
}

impl WavSource {
    /// Read the WAV header of `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AudioSourceError> {
        let path = path.as_ref().to_path_buf();
        let reader = WavReader::open(&path).map_err(map_hound_error)?;
        let spec = reader.spec();
        if spec.sample_rate == 0 || spec.channels == 0 {
            return Err(AudioSourceError::Encode(format!(
                "{}: invalid WAV header",
                path.display()
            )));
        }

        Ok(Self {
            frames: reader.duration(),
            spec,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    pub fn duration_ms(&self) -> u64 {
        self.frames as u64 * 1000 / self.spec.sample_rate as u64
    }

    /// Track identified by the file path
    pub fn into_track(self) -> AudioTrack {
        let id = self.path.display().to_string();
        let duration_ms = self.duration_ms();
        AudioTrack::new(id, duration_ms, Arc::new(self))
    }

    fn frame_at(&self, ms: u64) -> u32 {
        let frame = ms * self.spec.sample_rate as u64 / 1000;
        frame.min(self.frames as u64) as u32
    }
}

#[async_trait]
impl AudioSource for WavSource {
    async fn read_window(&self, start_ms: u64, end_ms: u64) -> Result<Vec<u8>, AudioSourceError> {
        let duration_ms = self.duration_ms();
        if start_ms >= end_ms || start_ms >= duration_ms {
            return Err(AudioSourceError::OutOfRange {
                start_ms,
                end_ms,
                duration_ms,
            });
        }

        let path = self.path.clone();
        let spec = self.spec;
        let start_frame = self.frame_at(start_ms);
        let end_frame = self.frame_at(end_ms);

        tokio::task::spawn_blocking(move || encode_window(&path, spec, start_frame, end_frame))
            .await
            .map_err(|e| AudioSourceError::Encode(format!("window task failed: {}", e)))?
    }
}

/// Copy frames `[start_frame, end_frame)` of `path` into a new WAV buffer
fn encode_window(
    path: &Path,
    spec: WavSpec,
    start_frame: u32,
    end_frame: u32,
) -> Result<Vec<u8>, AudioSourceError> {
    let mut reader = WavReader::open(path).map_err(map_hound_error)?;
    reader.seek(start_frame)?;

    let sample_count = (end_frame - start_frame) as usize * spec.channels as usize;
    let mut buffer = Cursor::new(Vec::with_capacity(
        44 + sample_count * (spec.bits_per_sample as usize / 8).max(1),
    ));

    {
        let mut writer = WavWriter::new(&mut buffer, spec).map_err(map_hound_error)?;
        match spec.sample_format {
            SampleFormat::Float => copy_samples::<f32>(&mut reader, &mut writer, sample_count)?,
            SampleFormat::Int => copy_samples::<i32>(&mut reader, &mut writer, sample_count)?,
        }
        writer.finalize().map_err(map_hound_error)?;
    }

    Ok(buffer.into_inner())
}

fn copy_samples<S: hound::Sample>(
    reader: &mut WavReader<BufReader<File>>,
    writer: &mut WavWriter<&mut Cursor<Vec<u8>>>,
    sample_count: usize,
) -> Result<(), AudioSourceError> {
    for sample in reader.samples::<S>().take(sample_count) {
        writer
            .write_sample(sample.map_err(map_hound_error)?)
            .map_err(map_hound_error)?;
    }
    Ok(())
}

fn map_hound_error(err: hound::Error) -> AudioSourceError {
    match err {
        hound::Error::IoError(e) => AudioSourceError::Io(e),
        other => AudioSourceError::Encode(other.to_string()),
    }
}
