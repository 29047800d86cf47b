// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Per-IP ingress rate limiting.
//!
//! Fixed one-minute buckets per client IP; a request beyond the per-minute
//! budget is rejected with 429 before it reaches validation. Stale buckets
//! are dropped opportunistically on the writes that touch them.

use pulsestream::env_vars;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Default per-IP budget, requests per minute.
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 600;

/// Per-IP fixed-window request limiter.
pub struct RequestRateLimiter {
    buckets: Mutex<HashMap<String, (i64, u32)>>,
    max_per_minute: u32,
}

impl RequestRateLimiter {
    /// Limiter with the given per-minute budget.
    #[must_use]
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_per_minute: max_per_minute.max(1),
        }
    }

    /// Limiter configured from `INGESTION_MAX_REQUESTS_PER_MINUTE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(env_vars::env_u32_or_default(
            env_vars::INGESTION_MAX_REQUESTS_PER_MINUTE,
            DEFAULT_MAX_REQUESTS_PER_MINUTE,
        ))
    }

    /// Whether a request from `ip` fits the current minute's budget.
    pub fn try_acquire(&self, ip: &str) -> bool {
        self.try_acquire_at(ip, chrono::Utc::now().timestamp())
    }

    pub(crate) fn try_acquire_at(&self, ip: &str, unix_seconds: i64) -> bool {
        let minute = unix_seconds / 60;
        #[allow(clippy::expect_used)] // poisoning only on a panicked holder
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");

        // Drop every stale bucket while we hold the lock; the map stays
        // bounded by the number of IPs seen in the current minute.
        buckets.retain(|_, (bucket_minute, _)| *bucket_minute == minute);

        let (_, count) = buckets.entry(ip.to_string()).or_insert((minute, 0));
        if *count >= self.max_per_minute {
            warn!(ip, limit = self.max_per_minute, "ingress rate limit exceeded");
            false
        } else {
            *count += 1;
            true
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_enforced_within_minute() {
        let limiter = RequestRateLimiter::new(3);
        let t = 1_700_000_000;
        assert!(limiter.try_acquire_at("10.0.0.1", t));
        assert!(limiter.try_acquire_at("10.0.0.1", t + 1));
        assert!(limiter.try_acquire_at("10.0.0.1", t + 2));
        assert!(!limiter.try_acquire_at("10.0.0.1", t + 3));
    }

    #[test]
    fn test_budget_is_per_ip() {
        let limiter = RequestRateLimiter::new(1);
        let t = 1_700_000_000;
        assert!(limiter.try_acquire_at("10.0.0.1", t));
        assert!(limiter.try_acquire_at("10.0.0.2", t));
        assert!(!limiter.try_acquire_at("10.0.0.1", t + 1));
    }

    #[test]
    fn test_budget_resets_next_minute() {
        let limiter = RequestRateLimiter::new(1);
        let t = 1_700_000_000;
        assert!(limiter.try_acquire_at("10.0.0.1", t));
        assert!(!limiter.try_acquire_at("10.0.0.1", t + 10));
        assert!(limiter.try_acquire_at("10.0.0.1", t + 60));
    }
}
