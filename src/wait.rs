//! Bounded, cancellable polling of remote state.
//!
//! Uploads and runs are processed asynchronously by the farm. [`poll_until`]
//! sleeps, checks, and repeats with a growing interval until the check reports
//! a terminal state, the policy's budget runs out, or the caller cancels.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::farm::FarmError;

/// What a single check observed.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    /// Terminal and successful; polling stops with the value.
    Ready(T),
    /// Still in progress; the string is the status shown to the user.
    Pending(String),
    /// Terminal and unsuccessful; polling stops with the reason.
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("Timed out after {elapsed:?} waiting for {what} (last status {last_status})")]
    TimedOut {
        what: String,
        elapsed: Duration,
        last_status: String,
    },

    #[error("Cancelled while waiting for {what}")]
    Cancelled { what: String },

    #[error("{what} failed: {reason}")]
    Failed { what: String, reason: String },

    #[error(transparent)]
    Farm(#[from] FarmError),
}

/// Pacing and limits of a wait.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    /// Factor applied to the interval after every pending check.
    pub backoff: f64,
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(4),
            max_interval: Duration::from_secs(30),
            backoff: 1.5,
            timeout: None,
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    /// Fixed interval, no backoff, no limits.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: 1.0,
            timeout: None,
            max_attempts: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// The delay following `current`, capped at `max_interval`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let factor = if self.backoff.is_finite() && self.backoff >= 1.0 {
            self.backoff
        } else {
            1.0
        };
        let max = self.max_interval.max(self.interval);
        Duration::try_from_secs_f64(current.as_secs_f64() * factor)
            .unwrap_or(max)
            .min(max)
    }
}

/// Polls `check` until it reports a terminal state.
///
/// Each attempt sleeps first, then checks, so a freshly created resource is
/// never queried immediately. Errors from `check` end the wait at once.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, FarmError>>,
{
    let start = Instant::now();
    let mut delay = policy.interval;
    let mut attempts = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(WaitError::Cancelled { what: what.to_string() });
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempts += 1;
        let last_status = match check().await? {
            PollStatus::Ready(value) => {
                debug!("{} ready after {} checks", what, attempts);
                return Ok(value);
            }
            PollStatus::Failed(reason) => {
                return Err(WaitError::Failed {
                    what: what.to_string(),
                    reason,
                });
            }
            PollStatus::Pending(status) => status,
        };
        debug!("{} is {}", what, last_status);

        let elapsed = start.elapsed();
        let out_of_time = policy.timeout.is_some_and(|t| elapsed >= t);
        let out_of_attempts = policy.max_attempts.is_some_and(|max| attempts >= max);
        if out_of_time || out_of_attempts {
            return Err(WaitError::TimedOut {
                what: what.to_string(),
                elapsed,
                last_status,
            });
        }

        delay = policy.next_delay(delay);
        if let Some(timeout) = policy.timeout {
            delay = delay.min(timeout.saturating_sub(elapsed));
        }
    }
}
