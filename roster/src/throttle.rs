use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::time::Duration;

/// Pacing policy applied before each ranking-seed upstream lookup.
#[async_trait]
pub trait SeedThrottle: Send + Sync {
    /// Waits until the next upstream lookup may start.
    async fn acquire(&self);
}

/// Enforces a minimum interval between consecutive acquisitions.
///
/// The cooldown spaces acquisitions apart; it is not a delay before the
/// first one. A fresh throttle, or one idle for a full interval, lets the
/// next acquisition through immediately.
pub struct IntervalThrottle {
    // None when the interval is zero
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl IntervalThrottle {
    pub fn new(min_interval: Duration) -> Self {
        IntervalThrottle {
            limiter: Quota::with_period(min_interval).map(RateLimiter::direct),
        }
    }
}

#[async_trait]
impl SeedThrottle for IntervalThrottle {
    async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_interval_is_enforced() {
        let throttle = IntervalThrottle::new(Duration::from_millis(200));

        let started = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_first_acquisition_does_not_wait() {
        let throttle = IntervalThrottle::new(Duration::from_secs(5));

        let started = Instant::now();
        throttle.acquire().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let throttle = IntervalThrottle::new(Duration::ZERO);

        let started = Instant::now();
        for _ in 0..10 {
            throttle.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
