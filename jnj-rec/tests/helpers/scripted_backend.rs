//! Scripted recognition backend
//!
//! Replies are chosen by a closure from the decoded window and the attempt
//! number for that window, so tests script behaviour per track and per time.

use super::memory_source::{decode_window, Window};
use async_trait::async_trait;
use jnj_rec::error::BackendError;
use jnj_rec::models::TrackMatch;
use jnj_rec::services::{BackendResponse, RecognitionBackend};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Song {
        title: String,
        artist: String,
        confidence: f64,
    },
    NoMatch,
    Fail(BackendError),
    /// Never answers; only a timeout or cancellation ends the call
    Hang,
    /// Answer after a delay
    After(Duration, Box<Reply>),
}

impl Reply {
    pub fn song(title: &str, artist: &str, confidence: f64) -> Self {
        Reply::Song {
            title: title.to_string(),
            artist: artist.to_string(),
            confidence,
        }
    }

    pub fn after(delay: Duration, reply: Reply) -> Self {
        Reply::After(delay, Box::new(reply))
    }
}

type Script = dyn Fn(&Window, u32) -> Reply + Send + Sync;

/// Backend answering from a script; records every call
pub struct ScriptedBackend {
    name: String,
    script: Box<Script>,
    attempts: Mutex<HashMap<(String, u64), u32>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    /// `script(window, attempt)` with `attempt` counted from 1 per window
    pub fn new(
        name: &str,
        script: impl Fn(&Window, u32) -> Reply + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Box::new(script),
            attempts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    /// Same reply for every call
    pub fn constant(name: &str, reply: Reply) -> Arc<Self> {
        Self::new(name, move |_, _| reply.clone())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls made for windows of `track_id`
    pub fn calls_for(&self, track_id: &str) -> u32 {
        let attempts = self.attempts.lock().unwrap();
        attempts
            .iter()
            .filter(|((id, _), _)| id == track_id)
            .map(|(_, n)| *n)
            .sum()
    }

    /// Calls made for the window of `track_id` starting at `start_ms`
    pub fn attempts_for(&self, track_id: &str, start_ms: u64) -> u32 {
        let attempts = self.attempts.lock().unwrap();
        attempts
            .get(&(track_id.to_string(), start_ms))
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn play(&self, reply: Reply) -> Result<BackendResponse, BackendError> {
        let mut reply = reply;
        loop {
            match reply {
                Reply::After(delay, next) => {
                    tokio::time::sleep(delay).await;
                    reply = *next;
                }
                Reply::Hang => std::future::pending::<()>().await,
                Reply::Song {
                    title,
                    artist,
                    confidence,
                } => {
                    let raw = serde_json::json!({ "title": title, "artist": artist });
                    return Ok(BackendResponse::matched(
                        TrackMatch::new(title, artist),
                        confidence,
                        raw,
                    ));
                }
                Reply::NoMatch => return Ok(BackendResponse::no_match(serde_json::Value::Null)),
                Reply::Fail(err) => return Err(err),
            }
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecognitionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn identify(&self, audio: &[u8]) -> Result<BackendResponse, BackendError> {
        let window = decode_window(audio)
            .ok_or_else(|| BackendError::Rejected("unexpected audio payload".to_string()))?;

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts
                .entry((window.track_id.clone(), window.start_ms))
                .or_insert(0);
            *count += 1;
            *count
        };
        self.calls.fetch_add(1, Ordering::SeqCst);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let reply = (self.script)(&window, attempt);
        self.play(reply).await
    }
}
