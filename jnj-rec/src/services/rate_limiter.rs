//! Shared per-credential call spacing
//!
//! One limiter is built per backend credential and cloned (by `Arc`) into
//! every worker that calls that backend, so the minimum spacing holds across
//! all concurrent tracks and segments.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Minimum-spacing limiter shared by every caller of one backend credential
#[derive(Clone)]
pub struct SharedRateLimiter {
    /// `None` when spacing is zero (no limit)
    limiter: Option<Arc<DirectLimiter>>,
    spacing: Duration,
}

impl SharedRateLimiter {
    /// One call per `spacing`, no bursts
    pub fn new(spacing: Duration) -> Self {
        let limiter = Quota::with_period(spacing).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { limiter, spacing }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Wait until the next call slot.
    ///
    /// Callers race this against their cancellation token; dropping the
    /// future gives up the wait without consuming a slot.
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                tracing::debug!(spacing_ms = self.spacing.as_millis() as u64, "Rate limiting: waiting for slot");
                limiter.until_ready().await;
            }
        }
    }
}

impl std::fmt::Debug for SharedRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRateLimiter")
            .field("spacing", &self.spacing)
            .finish()
    }
}
