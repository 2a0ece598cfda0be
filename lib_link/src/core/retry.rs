//! # Retry Policy
//!
//! One bounded retry/backoff algorithm for every guarded socket operation
//! (connect, send, receive). Bounding retries with exponential spacing
//! avoids hot-looping against a persistently unreachable peer while still
//! absorbing transient blips.

use std::time::Duration;
use tokio::time::sleep;

use crate::error::LinkError;

// Backoff exponent cap so `2^attempt` cannot overflow with an extreme
// max_retries setting
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Bounded exponential-backoff executor.
///
/// A failing attempt `n` (starting at 1) waits `backoff_unit * 2^n` before
/// the next one. After `max_retries` consecutive failures the operation is
/// abandoned with [`LinkError::RetriesExhausted`]; a failure classified
/// terminal by [`LinkError::is_retryable`] is returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// Overrides the backoff time unit. Tests drive the same algorithm at
    /// millisecond scale.
    pub fn with_backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    /// Runs `op` until it succeeds, fails terminally, or the retry budget
    /// is spent. The attempt counter is fresh per call.
    pub async fn run<T, F>(&self, operation: &'static str, mut op: F) -> Result<T, LinkError>
    where
        F: AsyncFnMut() -> Result<T, LinkError>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    let backoff = self
                        .backoff_unit
                        .saturating_mul(1u32 << attempt.min(MAX_BACKOFF_EXPONENT));
                    log::warn!(
                        "{operation} failed (attempt {attempt}/{}): {err}; backing off {:?}",
                        self.max_retries,
                        backoff
                    );
                    sleep(backoff).await;
                    if attempt >= self.max_retries {
                        log::error!("{operation}: retries exhausted after {attempt} attempts");
                        return Err(LinkError::RetriesExhausted {
                            operation,
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn exhausts_after_exactly_max_retries() {
        let policy = RetryPolicy::new(3).with_backoff_unit(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("probe", async || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LinkError::Timeout(Duration::from_millis(1)))
            })
            .await;

        // Exactly max_retries attempts, never one more
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(LinkError::RetriesExhausted {
                operation: "probe",
                attempts: 3,
                ..
            }) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn backoff_doubles_per_attempt() {
        let unit = Duration::from_millis(5);
        let policy = RetryPolicy::new(3).with_backoff_unit(unit);

        let started = Instant::now();
        let _ = policy
            .run::<(), _>("probe", async || Err(LinkError::Timeout(unit)))
            .await;

        // 2^1 + 2^2 + 2^3 units of backoff
        assert!(started.elapsed() >= unit * 14);
    }

    #[tokio::test]
    async fn succeeds_midway_without_spending_the_budget() {
        let policy = RetryPolicy::new(5).with_backoff_unit(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("probe", async || {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LinkError::Validation("too short".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_failures_are_not_retried() {
        let policy = RetryPolicy::new(5).with_backoff_unit(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("receive", async || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LinkError::PeerClosed)
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(LinkError::PeerClosed)));
    }
}
