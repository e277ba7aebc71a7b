//! Bounded polling.
//!
//! Every wait in the pipeline goes through [`wait_for_value`] or
//! [`wait_for_predicate`], so timeout and poll policy live in one place.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

/// A wait ran out of time before its condition held.
#[derive(Debug, thiserror::Error)]
#[error("{what} did not hold within {timeout:?}")]
pub struct WaitTimeout {
    pub what: String,
    pub timeout: Duration,
    /// Last error raised by the condition, if it ever failed outright
    pub last_error: Option<String>,
}

/// Poll `probe` until it yields `Some`, or give up after `policy.timeout`.
///
/// Errors from `probe` count as "not yet"; the most recent one is kept in the
/// returned [`WaitTimeout`]. A single call that hangs is cut off at the deadline.
pub async fn wait_for_value<T, F, Fut>(
    what: &str,
    policy: WaitPolicy,
    mut probe: F,
) -> Result<T, WaitTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let start = Instant::now();
    let mut last_error = None;

    loop {
        let remaining = policy.timeout.saturating_sub(start.elapsed());
        match tokio::time::timeout(remaining, probe()).await {
            Ok(Ok(Some(value))) => return Ok(value),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                trace!(what, error = ?e, "wait condition failed, retrying");
                last_error = Some(format!("{e:#}"));
            }
            Err(_elapsed) => {}
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Err(WaitTimeout {
                what: what.to_string(),
                timeout: policy.timeout,
                last_error,
            });
        }
        tokio::time::sleep(policy.poll_interval.min(policy.timeout - elapsed)).await;
    }
}

/// Poll `condition` until it returns `true`, or give up after `policy.timeout`.
pub async fn wait_for_predicate<F, Fut>(
    what: &str,
    policy: WaitPolicy,
    mut condition: F,
) -> Result<(), WaitTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    wait_for_value(what, policy, || {
        let check = condition();
        async move { check.await.map(|held| held.then_some(())) }
    })
    .await
}
