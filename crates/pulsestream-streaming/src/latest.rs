// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Latest-Metric Reader
//!
//! Periodic snapshots of the latest-value cache for overview dashboards.
//! Every tick scans `monitoring:metric:*` (optionally scoped to one
//! service), decodes the values and hands the batch to the subscriber as
//! one snapshot. The subscriber queue keeps only the newest snapshot; a
//! dashboard that stalls for a minute gets the current picture, not a
//! backlog of stale ones.

use crate::hub::{OverflowPolicy, PolicyQueue, Subscription};
use pulsestream::backend::MetricCache;
use pulsestream::event::MetricEvent;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Subscribe to periodic latest-value snapshots.
#[must_use]
pub fn subscribe_latest(
    cache: Arc<dyn MetricCache>,
    service: Option<String>,
    interval: Duration,
) -> Subscription<Vec<MetricEvent>> {
    let queue = Arc::new(PolicyQueue::new(1, OverflowPolicy::KeepLatest));
    let task_queue = Arc::clone(&queue);
    let forwarder = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match cache.scan_latest_metrics(service.as_deref()).await {
                Ok(snapshot) => {
                    if !snapshot.is_empty() {
                        task_queue.push(None, snapshot);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "latest-value scan failed; skipping tick");
                }
            }
        }
    });
    Subscription::from_parts(queue, forwarder)
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;
    use pulsestream::event::{wire_time, MetricType};
    use pulsestream::testing::MemoryCache;

    fn metric(service: &str, metric_type: MetricType, value: f64) -> MetricEvent {
        MetricEvent::new(
            service,
            metric_type,
            value,
            wire_time::parse("2026-03-14T10:00:00").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_snapshot_scoped_to_service() {
        let cache = Arc::new(MemoryCache::new());
        cache.put_latest_metric(&metric("web", MetricType::Cpu, 10.0)).await.unwrap();
        cache.put_latest_metric(&metric("web", MetricType::Memory, 20.0)).await.unwrap();
        cache.put_latest_metric(&metric("db", MetricType::Cpu, 30.0)).await.unwrap();

        let sub = subscribe_latest(
            Arc::clone(&cache) as Arc<dyn MetricCache>,
            Some("web".to_string()),
            Duration::from_millis(10),
        );
        let snapshot = sub.recv().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|m| m.service_name == "web"));
    }

    #[tokio::test]
    async fn test_unscoped_snapshot_sees_all_services() {
        let cache = Arc::new(MemoryCache::new());
        cache.put_latest_metric(&metric("web", MetricType::Cpu, 10.0)).await.unwrap();
        cache.put_latest_metric(&metric("db", MetricType::Cpu, 30.0)).await.unwrap();

        let sub = subscribe_latest(
            Arc::clone(&cache) as Arc<dyn MetricCache>,
            None,
            Duration::from_millis(10),
        );
        let snapshot = sub.recv().await.unwrap();
        let services: Vec<&str> = snapshot.iter().map(|m| m.service_name.as_str()).collect();
        assert_eq!(services, vec!["db", "web"]);
    }
}
