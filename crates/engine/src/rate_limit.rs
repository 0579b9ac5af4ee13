//! Shared request-rate gate.
//!
//! A budget of N requests per minute becomes a minimum spacing of `60 / N`
//! seconds between granted acquisitions, across every concurrent caller.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces out provider calls so that no two grants are closer than the
/// configured interval.
///
/// The next-allowed instant is read, waited on and advanced under a single
/// lock. Callers queue on that lock, so grants are strictly serialized even
/// when many workers call [`RateLimiter::acquire`] at once.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Option<Duration>,
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter for `requests_per_minute`; `0` disables throttling.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let min_interval = (requests_per_minute > 0)
            .then(|| Duration::from_secs_f64(60.0 / f64::from(requests_per_minute)));
        Self {
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    /// Creates a limiter that never waits.
    pub fn unlimited() -> Self {
        Self::per_minute(0)
    }

    /// The enforced spacing, or `None` when throttling is disabled.
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Waits until the caller may issue its request.
    ///
    /// The first acquisition is granted immediately.
    pub async fn acquire(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };

        let mut next_allowed = self.next_allowed.lock().await;
        if let Some(at) = *next_allowed {
            tokio::time::sleep_until(at).await;
        }
        *next_allowed = Some(Instant::now() + interval);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn interval_is_sixty_over_rate() {
        assert_eq!(RateLimiter::per_minute(60).min_interval(), Some(Duration::from_secs(1)));
        assert_eq!(RateLimiter::per_minute(120).min_interval(), Some(Duration::from_millis(500)));
        assert_eq!(RateLimiter::per_minute(0).min_interval(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..50 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_grants_are_spaced() {
        let limiter = RateLimiter::per_minute(30);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_grants_are_spaced() {
        let limiter = Arc::new(RateLimiter::per_minute(60));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        grants.sort();

        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
    }
}
