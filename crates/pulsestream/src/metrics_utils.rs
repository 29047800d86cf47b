// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

// Allow expect() in this module: metric names are compile-time literals and
// Opts construction over them cannot fail at runtime.
#![allow(clippy::expect_used)]

//! Safe Prometheus metric registration helpers.
//!
//! PulseStream crates are linked into several binaries; when two components
//! register the same metric name the default registry errors and the
//! upstream `register_*` macros panic on it. These helpers log and continue,
//! returning an unregistered metric as the fallback so pipelines never die
//! over telemetry.

use prometheus::{IntCounter, IntCounterVec, Opts};
use tracing::debug;

/// Register an `IntCounter` against the default registry, tolerating
/// duplicate registration.
pub fn int_counter(name: &str, help: &str) -> IntCounter {
    let counter =
        IntCounter::with_opts(Opts::new(name, help)).expect("counter opts from literals");
    if let Err(e) = prometheus::default_registry().register(Box::new(counter.clone())) {
        debug!(metric = name, error = %e, "metric already registered; using unregistered fallback");
    }
    counter
}

/// Register an `IntCounterVec` against the default registry, tolerating
/// duplicate registration.
pub fn int_counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter =
        IntCounterVec::new(Opts::new(name, help), labels).expect("counter opts from literals");
    if let Err(e) = prometheus::default_registry().register(Box::new(counter.clone())) {
        debug!(metric = name, error = %e, "metric already registered; using unregistered fallback");
    }
    counter
}

// Counter names include the _total suffix per Prometheus naming convention.

/// Messages successfully published to Kafka.
pub const METRIC_EVENTS_PUBLISHED_TOTAL: &str = "pulsestream_events_published_total";
/// Kafka publish failures after retries.
pub const METRIC_PUBLISH_FAILURES_TOTAL: &str = "pulsestream_publish_failures_total";
/// Kafka publish retries.
pub const METRIC_PUBLISH_RETRIES_TOTAL: &str = "pulsestream_publish_retries_total";
/// Records dropped by the stream hub (decode failures).
pub const METRIC_HUB_DECODE_DROPS_TOTAL: &str = "pulsestream_hub_decode_drops_total";
/// Items evicted from subscriber queues by backpressure policy.
pub const METRIC_HUB_QUEUE_EVICTIONS_TOTAL: &str = "pulsestream_hub_queue_evictions_total";
/// Notifications suppressed by the throttler.
pub const METRIC_NOTIFICATIONS_SUPPRESSED_TOTAL: &str =
    "pulsestream_notifications_suppressed_total";

#[allow(clippy::unwrap_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration_is_tolerated() {
        let first = int_counter("pulsestream_test_dup_total", "test counter");
        let second = int_counter("pulsestream_test_dup_total", "test counter");
        first.inc();
        second.inc();
        // Both usable; no panic on the duplicate registration.
        assert_eq!(first.get(), 1);
    }
}
