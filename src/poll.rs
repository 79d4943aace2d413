//! Fixed-interval polling until a condition holds or a deadline passes
//!
//! This is the only retry loop in the crate. It waits for an eventually
//! consistent read (the tracked-event log) to catch up with a write (a survey
//! submission):
//! - Fixed interval between attempts, no backoff or jitter
//! - Deadline measured from the first attempt
//! - One final read after the deadline, returned as [`PollOutcome::TimedOut`]
//!
//! Fetch errors are not retried; they end the poll immediately.

use crate::error::ProbeResult;
use crate::logging::{log_debug, log_trace, log_warn};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Timing for [`poll_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Total time to keep polling before the final read
    pub timeout: Duration,
    /// Sleep between unsuccessful attempts
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(5),
        }
    }
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Terminal state of a poll; both variants carry the last value observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The condition held before the deadline
    Converged(T),
    /// The deadline passed; this is the final read, condition unchecked
    TimedOut(T),
}

impl<T> PollOutcome<T> {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Converged(value) | Self::TimedOut(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Converged(value) | Self::TimedOut(value) => value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PollOutcome<U> {
        match self {
            Self::Converged(value) => PollOutcome::Converged(f(value)),
            Self::TimedOut(value) => PollOutcome::TimedOut(f(value)),
        }
    }
}

/// Repeatedly `fetch` until `is_done` accepts the value or `policy.timeout`
/// elapses.
///
/// After the deadline one more fetch is made and returned as
/// [`PollOutcome::TimedOut`] without consulting `is_done`. The caller is
/// blocked for at most `timeout` plus one interval plus one fetch.
pub async fn poll_until<T, F, Fut, P>(
    policy: &PollPolicy,
    mut fetch: F,
    mut is_done: P,
) -> ProbeResult<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<T>>,
    P: FnMut(&T) -> bool,
{
    let start_time = Instant::now();
    let mut attempt: u32 = 0;

    while start_time.elapsed() < policy.timeout {
        attempt += 1;
        let value = fetch().await?;

        if is_done(&value) {
            log_debug!(
                attempt = attempt,
                elapsed_ms = start_time.elapsed().as_millis(),
                "Poll condition satisfied"
            );
            return Ok(PollOutcome::Converged(value));
        }

        log_trace!(
            attempt = attempt,
            interval_ms = policy.interval.as_millis(),
            "Poll condition not yet satisfied, sleeping"
        );
        sleep(policy.interval).await;
    }

    let value = fetch().await?;

    log_warn!(
        attempts = attempt + 1,
        timeout_ms = policy.timeout.as_millis(),
        "Poll deadline passed, returning final snapshot"
    );

    Ok(PollOutcome::TimedOut(value))
}
