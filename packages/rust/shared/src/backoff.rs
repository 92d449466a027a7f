//! Exponential backoff with jitter, interruptible by a cancellation token.
//!
//! Used for crawl-job polling and for the settle wait after an association
//! attempt. Tests pass [`BackoffPolicy::immediate`] to stay off the wall clock.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, VoiceBoltError};

/// Retry/poll schedule: `initial_delay_ms * multiplier^attempt`, capped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay (before jitter).
    pub max_delay_ms: u64,
    /// Total number of attempts allowed.
    pub max_attempts: u32,
    /// Multiply each delay by a random factor in `[0.5, 1.5]`.
    #[serde(default)]
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 3,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Policy for crawl-status polling: ~120 polls starting at one per second.
    pub fn crawl_poll() -> Self {
        Self {
            initial_delay_ms: 1000,
            multiplier: 1.5,
            max_delay_ms: 10_000,
            max_attempts: 120,
            jitter: true,
        }
    }

    /// Policy for the propagation wait before re-checking an association.
    pub fn settle() -> Self {
        Self {
            initial_delay_ms: 2000,
            multiplier: 1.0,
            max_delay_ms: 2000,
            max_attempts: 1,
            jitter: false,
        }
    }

    /// Zero-delay policy with the given attempt budget.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay_ms: 0,
            multiplier: 1.0,
            max_delay_ms: 0,
            max_attempts,
            jitter: false,
        }
    }

    /// Delay to wait before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_delay_ms as f64);

        let millis = if self.jitter && capped > 0.0 {
            let factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped * factor
        } else {
            capped
        };

        Duration::from_millis(millis as u64)
    }

    /// Sleep for [`delay_for`](Self::delay_for)`(attempt)`, or return
    /// [`VoiceBoltError::Cancelled`] if `cancel` fires first.
    pub async fn wait(&self, attempt: u32, cancel: &CancellationToken) -> Result<()> {
        let delay = self.delay_for(attempt);
        if cancel.is_cancelled() {
            return Err(VoiceBoltError::Cancelled);
        }
        if delay.is_zero() {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(VoiceBoltError::Cancelled),
        }
    }
}
