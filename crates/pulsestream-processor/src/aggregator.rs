// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Metric Aggregator
//!
//! The non-alerting track of metric processing: cache the latest value and
//! append the history row, concurrently. The aggregator never fails its
//! caller: cache misses degrade to `cached=false`, store failures are
//! logged and reported as `persisted=false`, and the alert track proceeds
//! either way. A best-effort rolling-stats refresh rides along for the
//! overview dashboards.

use pulsestream::backend::{MetricCache, MetricHistory};
use pulsestream::event::MetricEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Window label for the rolling aggregate hash.
const STATS_WINDOW: &str = "1m";

/// Per-operation success report for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationOutcome {
    /// Latest-value cache write landed.
    pub cached: bool,
    /// History row was appended.
    pub persisted: bool,
}

/// Dual-write of each metric into the latest-value cache and the history
/// store.
pub struct Aggregator {
    cache: Arc<dyn MetricCache>,
    history: Arc<dyn MetricHistory>,
}

impl Aggregator {
    /// Assemble an aggregator over its two seams.
    pub fn new(cache: Arc<dyn MetricCache>, history: Arc<dyn MetricHistory>) -> Self {
        Self { cache, history }
    }

    /// Process one metric. Infallible by contract; inspect the outcome for
    /// per-operation success.
    pub async fn process(&self, metric: &MetricEvent) -> AggregationOutcome {
        let (cached, persisted) = tokio::join!(self.cache_latest(metric), self.persist(metric));
        self.refresh_stats(metric).await;
        debug!(
            service = %metric.service_name,
            metric_type = %metric.metric_type,
            cached,
            persisted,
            "metric aggregated"
        );
        AggregationOutcome { cached, persisted }
    }

    async fn cache_latest(&self, metric: &MetricEvent) -> bool {
        match self.cache.put_latest_metric(metric).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(service = %metric.service_name, error = %e, "latest-value cache write failed");
                false
            }
        }
    }

    async fn persist(&self, metric: &MetricEvent) -> bool {
        match self.history.insert_metric(metric).await {
            Ok(()) => true,
            Err(e) => {
                warn!(service = %metric.service_name, error = %e, "metric history insert failed");
                false
            }
        }
    }

    /// Fold this sample into the rolling aggregate hash. Purely best-effort.
    async fn refresh_stats(&self, metric: &MetricEvent) {
        let current = match self
            .cache
            .stats(&metric.service_name, metric.metric_type, STATS_WINDOW)
            .await
        {
            Ok(current) => current,
            Err(_) => return,
        };
        let updated = fold_sample(&current, metric.metric_value);
        if let Err(e) = self
            .cache
            .put_stats(&metric.service_name, metric.metric_type, STATS_WINDOW, &updated)
            .await
        {
            debug!(service = %metric.service_name, error = %e, "stats refresh skipped");
        }
    }
}

fn fold_sample(current: &HashMap<String, f64>, value: f64) -> HashMap<String, f64> {
    let count = current.get("count").copied().unwrap_or(0.0) + 1.0;
    let sum = current.get("sum").copied().unwrap_or(0.0) + value;
    let min = current
        .get("min")
        .copied()
        .map_or(value, |m| m.min(value));
    let max = current
        .get("max")
        .copied()
        .map_or(value, |m| m.max(value));

    let mut updated = HashMap::new();
    updated.insert("count".to_string(), count);
    updated.insert("sum".to_string(), sum);
    updated.insert("min".to_string(), min);
    updated.insert("max".to_string(), max);
    updated.insert("avg".to_string(), sum / count);
    updated
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;
    use pulsestream::event::{wire_time, MetricType};
    use pulsestream::keys;
    use pulsestream::testing::{MemoryCache, MemoryMetricHistory};

    fn metric(value: f64) -> MetricEvent {
        MetricEvent::new(
            "web",
            MetricType::Cpu,
            value,
            wire_time::parse("2026-03-14T10:00:00").unwrap(),
        )
    }

    fn fixture() -> (Aggregator, Arc<MemoryCache>, Arc<MemoryMetricHistory>) {
        let cache = Arc::new(MemoryCache::new());
        let history = Arc::new(MemoryMetricHistory::new());
        let aggregator = Aggregator::new(
            Arc::clone(&cache) as Arc<dyn MetricCache>,
            Arc::clone(&history) as Arc<dyn MetricHistory>,
        );
        (aggregator, cache, history)
    }

    #[tokio::test]
    async fn test_both_tracks_succeed() {
        let (aggregator, cache, history) = fixture();
        let outcome = aggregator.process(&metric(42.0)).await;
        assert_eq!(
            outcome,
            AggregationOutcome {
                cached: true,
                persisted: true
            }
        );
        assert_eq!(history.rows().len(), 1);
        let latest = cache.latest_metric("web", MetricType::Cpu).await.unwrap();
        assert_eq!(latest.unwrap().metric_value, 42.0);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_propagate() {
        let (aggregator, _cache, history) = fixture();
        history.set_fail_inserts(true);
        let outcome = aggregator.process(&metric(42.0)).await;
        assert!(outcome.cached);
        assert!(!outcome.persisted);
    }

    #[tokio::test]
    async fn test_degraded_cache_reports_not_cached() {
        let (aggregator, cache, history) = fixture();
        cache.set_degraded(true);
        let outcome = aggregator.process(&metric(42.0)).await;
        assert!(!outcome.cached);
        // The history track is unaffected.
        assert!(outcome.persisted);
        assert_eq!(history.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_stats_fold() {
        let (aggregator, cache, _history) = fixture();
        aggregator.process(&metric(10.0)).await;
        aggregator.process(&metric(30.0)).await;

        let stats = cache
            .stats_snapshot(&keys::stats("web", MetricType::Cpu, "1m"))
            .unwrap();
        assert_eq!(stats["count"], 2.0);
        assert_eq!(stats["sum"], 40.0);
        assert_eq!(stats["min"], 10.0);
        assert_eq!(stats["max"], 30.0);
        assert_eq!(stats["avg"], 20.0);
    }
}
