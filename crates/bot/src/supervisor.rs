//! Generic resilience helpers shared by the supervisor's worker tasks
//! (§4.11): a capped-exponential-backoff restart shell, plus the
//! whole-minute boundary check that drives market refresh.

use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Runs `worker` forever. A returned error is logged and followed by a
/// sleep at the current backoff, which then doubles (capped at 60s); any
/// clean `Ok(())` return resets backoff to the floor before the next
/// attempt. Never returns — intended to be the body of a `tokio::spawn`.
pub async fn run_resilient<F, Fut, E>(name: &'static str, mut worker: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match worker().await {
            Ok(()) => {
                info!(task = name, "supervised task exited cleanly, restarting");
                backoff = INITIAL_BACKOFF;
            }
            Err(e) => {
                error!(
                    task = name,
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "supervised task failed, restarting after backoff"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// True the first time `now` (epoch seconds) lands in a different
/// whole-minute bucket than `previous` — drives the market-refresh
/// scheduler (§4.11).
pub fn crossed_minute_boundary(previous: i64, now: i64) -> bool {
    previous.div_euclid(60) != now.div_euclid(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_minute_does_not_cross() {
        assert!(!crossed_minute_boundary(100, 110));
    }

    #[test]
    fn next_minute_crosses() {
        assert!(crossed_minute_boundary(59, 60));
    }
}
