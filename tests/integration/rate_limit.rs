//! Fixed-window rate limiting on the real clock

use std::sync::Arc;
use std::time::Duration;

use game_health::ratelimit::{MemoryCounterStore, RateLimitPolicy, RateLimiter};

#[tokio::test]
async fn test_three_per_second() {
    let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()));
    let key = ["GET", "/api/v1/health", "10.0.0.7"];
    let window = Duration::from_secs(1);

    for _ in 0..3 {
        assert!(limiter.accept(&key, window, 3).await.unwrap());
    }
    assert!(!limiter.accept(&key, window, 3).await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(limiter.accept(&key, window, 3).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_callers_share_the_budget() {
    let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()));
    let policy = RateLimitPolicy {
        window: Duration::from_secs(5),
        limit: 10,
    };

    let calls = (0..50).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.accept_with(&["PUT", "/mute"], &policy).await })
    });
    let results = futures::future::join_all(calls).await;

    let admitted = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(true))))
        .count();
    assert_eq!(admitted, 10);
}

#[tokio::test]
async fn test_keys_do_not_share_windows() {
    let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()));
    let window = Duration::from_secs(5);

    assert!(limiter.accept(&["a", "1"], window, 1).await.unwrap());
    assert!(!limiter.accept(&["a", "1"], window, 1).await.unwrap());
    assert!(limiter.accept(&["a", "2"], window, 1).await.unwrap());
    assert!(limiter.accept(&["b", "1"], window, 1).await.unwrap());
}
