//! Fixed-interval retry loop with cancellation.
//!
//! The upstream API is rate-limited and fails in bursts; a fixed backoff
//! (typically minutes) is the pacing the operator tunes, so there is no
//! exponential growth or jitter here. Every error is retryable — renewal of
//! a stale credential is scheduled by the engine, not triggered by error
//! inspection.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Per-unit retry budget: total attempts (first try included) and the fixed
/// delay slept between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Run `operation` up to `policy.max_attempts` times, sleeping the fixed
/// delay between attempts.
///
/// Returns the first `Ok`, or the last error once attempts are exhausted.
/// Cancellation cuts the loop short at the next sleep; the pending error is
/// returned so the caller leaves the unit incomplete.
pub async fn with_retries<F, Fut, T, E>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_err: Option<E> = None;

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if attempt == max_attempts || cancel.is_cancelled() {
                    last_err = Some(e);
                    break;
                }
                tracing::warn!(
                    "Attempt {}/{} failed, retrying in {}s: {}",
                    attempt,
                    max_attempts,
                    policy.delay.as_secs(),
                    e
                );
                tokio::select! {
                    _ = tokio::time::sleep(policy.delay) => {}
                    _ = cancel.cancelled() => {
                        last_err = Some(e);
                        break;
                    }
                }
            }
        }
    }

    Err(last_err.expect("loop must have run at least once"))
}
