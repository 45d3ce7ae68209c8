//! Per-caller rate limiting
//!
//! Token bucket per client IP. A limit of zero disables limiting.

use dashmap::DashMap;
use std::{
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

/// Tokens left to one caller. The bucket holds at most one second's worth.
#[derive(Debug, Clone, Copy)]
struct Allowance {
    tokens: f64,
    updated: Instant,
}

impl Allowance {
    fn full(per_second: f64) -> Self {
        Self {
            tokens: per_second,
            updated: Instant::now(),
        }
    }

    fn take(&mut self, per_second: f64) -> bool {
        let now = Instant::now();
        let refill = now.saturating_duration_since(self.updated).as_secs_f64() * per_second;
        self.tokens = per_second.min(self.tokens + refill);
        self.updated = now;

        let allowed = self.tokens >= 1.0;
        if allowed {
            self.tokens -= 1.0;
        }
        allowed
    }
}

/// Requests-per-second limiter keyed by caller IP
pub struct RateLimiter {
    buckets: Arc<DashMap<IpAddr, Allowance>>,

    /// Requests per second per IP, 0 disables limiting
    rate_limit: u32,

    /// Idle time after which a caller's bucket is dropped
    cleanup_interval: Duration,
}

impl RateLimiter {
    /// Create a limiter allowing `rate_limit` requests per second per IP.
    ///
    /// When limiting is enabled and a runtime is available, a background task
    /// drops idle buckets.
    pub fn new(rate_limit: u32) -> Self {
        let limiter = Self {
            buckets: Arc::new(DashMap::new()),
            rate_limit,
            cleanup_interval: Duration::from_secs(300),
        };

        if limiter.is_enabled() {
            limiter.start_cleanup_task();
        }

        limiter
    }

    /// Whether limiting is active
    pub fn is_enabled(&self) -> bool {
        self.rate_limit > 0
    }

    /// Whether a request from `ip` may proceed
    pub fn check_rate_limit(&self, ip: IpAddr) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let per_second = f64::from(self.rate_limit);
        let allowed = self
            .buckets
            .entry(ip)
            .or_insert_with(|| Allowance::full(per_second))
            .take(per_second);

        if !allowed {
            debug!("Rate limit exceeded for IP: {}", ip);
        }

        allowed
    }

    /// Number of callers currently tracked
    pub fn tracked_ips(&self) -> usize {
        self.buckets.len()
    }

    fn start_cleanup_task(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, rate limiter cleanup disabled");
            return;
        };

        let buckets = Arc::clone(&self.buckets);
        let interval = self.cleanup_interval;

        runtime.spawn(async move {
            let mut cleanup_interval = tokio::time::interval(interval);

            loop {
                cleanup_interval.tick().await;

                let now = Instant::now();
                buckets.retain(|_, allowance| now.saturating_duration_since(allowance.updated) < interval);

                debug!("Rate limiter cleanup: {} IPs tracked", buckets.len());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_zero_disables_limiting() {
        let limiter = RateLimiter::new(0);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        for _ in 0..1000 {
            assert!(limiter.check_rate_limit(ip));
        }
        assert_eq!(limiter.tracked_ips(), 0);
    }

    #[tokio::test]
    async fn test_bucket_exhausts() {
        let limiter = RateLimiter::new(3);
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(limiter.check_rate_limit(ip));
        assert!(limiter.check_rate_limit(ip));
        assert!(limiter.check_rate_limit(ip));
        assert!(!limiter.check_rate_limit(ip));

        assert!(limiter.check_rate_limit(other));
        assert_eq!(limiter.tracked_ips(), 2);
    }

    #[test]
    fn test_allowance_refills_over_time() {
        let mut allowance = Allowance {
            tokens: 0.0,
            updated: Instant::now().checked_sub(Duration::from_secs(10)).unwrap(),
        };

        // ten idle seconds still refill only one second's worth
        assert!(allowance.take(2.0));
        assert!(allowance.take(2.0));
        assert!(!allowance.take(2.0));
    }
}
