//! Rate limiting implementation
//!
//! Uses the governor crate. Ordway rate limits are configured as a
//! (possibly fractional) number of requests per second, so the quota is
//! expressed as one request per `1 / rps` seconds.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum number of requests per second
    pub requests_per_second: f64,
    /// Burst size (max requests allowed back to back)
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_size: 1,
        }
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter config
    pub fn new(requests_per_second: f64, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// Config for the `rate_limit_rps` option, `None` when limiting is disabled
    pub fn from_rps(rps: Option<f64>) -> Option<Self> {
        rps.filter(|r| r.is_finite() && *r > 0.0)
            .map(|r| Self::new(r, 1))
    }

    /// Interval between two requests at the configured rate
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.requests_per_second)
    }
}

/// Rate limiter owned by a single request handler
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimiterConfig) -> Self {
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(config.period())
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
            .allow_burst(burst);

        Self {
            limiter: Arc::new(Governor::direct(quota)),
        }
    }

    /// Wait until a request can be made
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_rate_limiter_config_default() {
        let config = RateLimiterConfig::default();
        assert!((config.requests_per_second - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.burst_size, 1);
    }

    #[test]
    fn test_from_rps() {
        assert!(RateLimiterConfig::from_rps(None).is_none());
        assert!(RateLimiterConfig::from_rps(Some(0.0)).is_none());

        let config = RateLimiterConfig::from_rps(Some(4.0)).unwrap();
        assert_eq!(config.period(), Duration::from_millis(250));
    }

    #[test]
    fn test_fractional_period() {
        let config = RateLimiterConfig::new(0.5, 1);
        assert_eq!(config.period(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_burst() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(1.0, 2));
        let start = Instant::now();

        limiter.wait().await;
        limiter.wait().await;

        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(20.0, 1));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.wait().await;
        }

        // first permit is immediate, the next two wait one 50ms period each
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
