// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff for Kubernetes API calls.
//!
//! Reads issued by the cluster layer are retried on transient API errors (429, 5xx,
//! connection failures). Writes are not retried here: a failed write is surfaced to
//! the reconciler, which collects it and lets the controller requeue.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum total time to spend retrying a single call (30 seconds)
const MAX_ELAPSED_TIME_SECS: u64 = 30;

/// Initial retry interval (100ms)
const INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Maximum interval between retries (5 seconds)
const MAX_INTERVAL_SECS: u64 = 5;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Exponential backoff with jitter.
pub struct ExponentialBackoff {
    /// Interval that will be returned next (before jitter)
    pub current_interval: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Maximum total elapsed time, `None` to retry forever
    pub max_elapsed_time: Option<Duration>,
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    start_time: Instant,
}

impl ExponentialBackoff {
    fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or `None` once the elapsed budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    /// Restart the schedule from the initial interval.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start_time = Instant::now();
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let jittered = min + (max - min) * rand::random::<f64>();
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Default backoff for Kubernetes API reads.
///
/// Retries at roughly 100ms, 200ms, 400ms, 800ms, 1.6s, 3.2s, then every 5s until
/// 30 seconds have elapsed. The reconcile loop requeues beyond that.
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(MAX_INTERVAL_SECS),
        Some(Duration::from_secs(MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Retry a Kubernetes API call with exponential backoff.
///
/// Transient errors are retried until the backoff budget is exhausted, after which
/// the last error is returned unchanged so callers can still classify it (for
/// example a 404 stays a 404).
///
/// # Errors
///
/// Returns the first non-retryable error, or the last transient error once the
/// backoff is exhausted.
pub async fn retry_api_call<T, F, Fut>(
    mut operation: F,
    operation_name: &str,
) -> Result<T, kube::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Kubernetes API call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) if !is_retryable_error(&e) => return Err(e),
            Err(e) => match backoff.next_backoff() {
                Some(duration) => {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        retry_after = ?duration,
                        error = %e,
                        "Retryable Kubernetes API error, will retry"
                    );
                    tokio::time::sleep(duration).await;
                }
                None => {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %e,
                        "Backoff exhausted, giving up"
                    );
                    return Err(e);
                }
            },
        }
    }
}

/// Whether a Kubernetes error is transient.
///
/// Rate limiting (429), server errors (5xx) and transport failures are retryable.
/// Every other client error is permanent.
pub(crate) fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => {
            api_err.code == 429 || (api_err.code >= 500 && api_err.code < 600)
        }
        kube::Error::Service(_) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
