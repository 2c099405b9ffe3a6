use std::time::Duration;
use tokio::sync::Notify;

/// Wait for `delay` or a shutdown signal, whichever comes first.
/// Returns true if shutdown was requested.
pub async fn check_shutdown_or_delay(shutdown: &Notify, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.notified() => true,
    }
}

/// Floor a millisecond timestamp to its minute boundary
///
/// Cache keys for transfer windows embed both endpoints; without bucketing,
/// every poll would mint a unique key and the cache would never hit.
pub fn floor_to_minute_ms(timestamp_ms: i64) -> i64 {
    timestamp_ms - timestamp_ms.rem_euclid(60_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_floor_to_minute() {
        assert_eq!(floor_to_minute_ms(1_756_166_459_999), 1_756_166_400_000);
        assert_eq!(floor_to_minute_ms(1_756_166_400_000), 1_756_166_400_000);
        assert_eq!(floor_to_minute_ms(59_999), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_elapses_without_shutdown() {
        let shutdown = Arc::new(Notify::new());
        assert!(!check_shutdown_or_delay(&shutdown, Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_wins_over_delay() {
        let shutdown = Arc::new(Notify::new());
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                check_shutdown_or_delay(&shutdown, Duration::from_secs(3600)).await
            })
        };
        tokio::task::yield_now().await;
        shutdown.notify_waiters();
        assert!(waiter.await.unwrap());
    }
}
