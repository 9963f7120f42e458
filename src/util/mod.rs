//! Utility module
//!
//! Helpers shared by the station loops.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleeps for `duration` unless `stop` fires first
///
/// Returns `false` when the sleep was cut short by the stop signal.
pub async fn sleep_or_stop(duration: Duration, stop: &CancellationToken) -> bool {
    tokio::select! {
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let stop = CancellationToken::new();
        let start = Instant::now();
        assert!(sleep_or_stop(Duration::from_millis(40), &stop).await);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cuts_sleep_short() {
        let stop = CancellationToken::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert!(!sleep_or_stop(Duration::from_secs(60), &stop).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
