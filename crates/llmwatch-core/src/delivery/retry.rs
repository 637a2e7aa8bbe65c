//! Retry scheduling for failed deliveries

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

/// Fixed backoff ladder: 1m, 5m, 15m, 1h, 2h.
///
/// Delivery volume is low enough that a predictable ladder beats exponential
/// backoff with jitter; attempts past the ladder reuse the final rung.
pub const RETRY_DELAYS: [u64; 5] = [60, 300, 900, 3600, 7200];

/// Backoff delay before the attempt following `attempts` completed attempts
pub fn retry_delay(attempts: i32) -> Duration {
    let index = attempts.max(1) as usize - 1;
    let seconds = RETRY_DELAYS.get(index).copied().unwrap_or(7200);
    Duration::from_secs(seconds)
}

/// Capability for running a deferred task.
///
/// The in-process implementation is fire-and-forget and dies with the
/// process; the periodic failed-delivery sweep is the durable backstop that
/// picks up anything a lost timer dropped.
pub trait RetryScheduler: Send + Sync {
    /// Run `task` after `delay`
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>);
}

/// Tokio timer backed scheduler
#[derive(Debug, Default)]
pub struct TokioRetryScheduler;

impl RetryScheduler for TokioRetryScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        debug!(delay_secs = delay.as_secs(), "Scheduling retry");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_matches_attempt_number() {
        assert_eq!(retry_delay(1), Duration::from_secs(60));
        assert_eq!(retry_delay(2), Duration::from_secs(300));
        assert_eq!(retry_delay(3), Duration::from_secs(900));
        assert_eq!(retry_delay(4), Duration::from_secs(3600));
        assert_eq!(retry_delay(5), Duration::from_secs(7200));
    }

    #[test]
    fn past_the_ladder_reuses_the_final_rung() {
        assert_eq!(retry_delay(6), Duration::from_secs(7200));
        assert_eq!(retry_delay(40), Duration::from_secs(7200));
    }
}
