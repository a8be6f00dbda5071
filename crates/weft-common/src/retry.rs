//! Backoff for transient mesh operations.
//!
//! Remote calls across the mesh (module pulls, result returns) fail
//! transiently while peers churn. [`with_backoff`] reruns such an
//! operation a bounded number of times, doubling the wait ceiling between
//! attempts and drawing each wait with full jitter so peers recovering
//! together do not stampede the same target.

use log::warn;
use std::future::Future;
use std::time::Duration;

/// Doubling wait schedule with full jitter: each wait is drawn uniformly
/// from half the current ceiling up to the whole of it.
#[derive(Debug, Clone)]
pub struct Backoff {
    ceiling: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            ceiling: initial.min(cap),
            cap,
        }
    }

    /// The wait before the next attempt; doubles the ceiling for the one
    /// after, up to the cap.
    pub fn next_wait(&mut self) -> Duration {
        let ceiling_ms = self.ceiling.as_millis().max(1) as u64;
        let half = ceiling_ms / 2;
        let wait = Duration::from_millis(half + fastrand::u64(0..=ceiling_ms - half));
        self.ceiling = (self.ceiling * 2).min(self.cap);
        wait
    }
}

/// Rerun `operation` until it succeeds or `attempt_budget` attempts have
/// been spent, sleeping a jittered, doubling wait between attempts. The
/// final error is returned unchanged.
pub async fn with_backoff<F, Fut, T, E>(
    mut operation: F,
    attempt_budget: u32,
    initial_wait: Duration,
    max_wait: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = Backoff::new(initial_wait, max_wait);
    let mut attempt: u32 = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempt_budget.max(1) => {
                warn!("Giving up after {attempt} attempt(s): {e}");
                return Err(e);
            }
            Err(e) => {
                let wait = backoff.next_wait();
                warn!("Attempt {attempt} failed ({e}); next try in {wait:?}");
                attempt += 1;
                tokio::time::sleep(wait).await;
            }
        }
    }
}
